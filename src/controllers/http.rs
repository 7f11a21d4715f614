use log::{info, warn};
use myrtio_ota::UploadVerdict;

use crate::{
    core::net::http::{
        AsyncChunkedReader as _,
        HttpConnection,
        HttpHandler,
        HttpMethod,
        HttpResult,
        ResponseHeaders,
    },
    infrastructure::types::{DeviceUsecasesImpl, FirmwareUsecasesImpl},
};

const CONFIG_RECEIVED: &str = "Config received";

/// HTTP surface of the device: firmware upload, device info and health.
pub struct OtaHttpController {
    firmware: &'static FirmwareUsecasesImpl,
    device: &'static DeviceUsecasesImpl,
}

impl OtaHttpController {
    pub fn new(
        firmware: &'static FirmwareUsecasesImpl,
        device: &'static DeviceUsecasesImpl,
    ) -> Self {
        Self { firmware, device }
    }

    async fn handle_update(&self, conn: &mut HttpConnection<'_>) -> HttpResult {
        let verdict = self.firmware.receive_upload(conn).await?;
        let written = write_verdict(conn, &verdict).await;
        // The image is already active, restart even if the peer went away
        self.firmware.restart_if_committed(&verdict);
        written
    }

    async fn handle_info(&self, conn: &mut HttpConnection<'_>) -> HttpResult {
        let info = self.device.device_info();
        conn.write_json(&info).await
    }
}

impl HttpHandler for OtaHttpController {
    async fn handle_request(&self, conn: &mut HttpConnection<'_>) -> HttpResult {
        match conn.route() {
            (HttpMethod::Post, "/update") => self.handle_update(conn).await,
            (HttpMethod::Get, "/info") => self.handle_info(conn).await,
            (HttpMethod::Get, "/status") => handle_status(conn).await,
            (HttpMethod::Post, "/config") => handle_config(conn).await,
            _ => serve_404(conn).await,
        }
    }
}

async fn write_verdict(conn: &mut HttpConnection<'_>, verdict: &UploadVerdict) -> HttpResult {
    conn.write_text(ResponseHeaders::from_code(verdict.status), verdict.body.as_str())
        .await
}

async fn handle_status(conn: &mut HttpConnection<'_>) -> HttpResult {
    conn.write_text(ResponseHeaders::success(), "OK").await
}

/// Accepted and discarded, configuration is fixed at build time.
async fn handle_config(conn: &mut HttpConnection<'_>) -> HttpResult {
    info!(
        "http: discarding config body of {:?} bytes",
        conn.content_length()
    );
    if let Err(e) = conn.discard_body().await {
        warn!("http: config body not drained: {:?}", e);
    }
    conn.write_text(ResponseHeaders::success(), CONFIG_RECEIVED)
        .await
}

async fn serve_404(conn: &mut HttpConnection<'_>) -> HttpResult {
    conn.write_text(ResponseHeaders::not_found(), "Not Found")
        .await
}
