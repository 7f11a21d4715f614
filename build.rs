use std::path::Path;

fn main() {
    println!("cargo:rerun-if-changed=.env");

    let dotenv = dotenv_build::Config {
        filename: Path::new(".env"),
        recursive_search: false,
        fail_if_missing_dotenv: false,
    };
    if let Err(err) = dotenv_build::output(dotenv) {
        println!("cargo:warning=failed to load .env: {err}");
    }

    let version = env!("CARGO_PKG_VERSION");
    let date = chrono::Utc::now().format("%Y%m%d");
    println!("cargo:rustc-env=BUILD_VERSION={version}+{date}");
}
