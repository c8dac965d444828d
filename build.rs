use std::env;
use std::fs;
use std::path::Path;

use camera_core::profile::{BoardProfile, BOARD_FEATURES};

/// Placeholder meaning "no uplink configured".
const SENTINEL: &str = "********";

fn main() -> anyhow::Result<()> {
    // Necessary for ESP-IDF
    embuild::espidf::sysenv::output();

    // Add crash log helper for better panic diagnostics
    println!("cargo:rustc-link-arg=-Wl,--undefined=esp_backtrace_print_app_description");

    select_board()?;
    export_credentials()?;

    Ok(())
}

/// Validate that exactly one board feature is on and export its selector.
fn select_board() -> anyhow::Result<()> {
    let selected: Vec<&str> = BOARD_FEATURES
        .iter()
        .filter(|(feature, _)| {
            let var = format!(
                "CARGO_FEATURE_{}",
                feature.to_ascii_uppercase().replace('-', "_")
            );
            env::var_os(var).is_some()
        })
        .map(|(_, selector)| *selector)
        .collect();

    let profile = BoardProfile::resolve(&selected).map_err(|e| anyhow::anyhow!("{}", e))?;
    println!("cargo:rustc-env=CAMERA_BOARD={}", profile.board.selector());
    Ok(())
}

fn define_value<'a>(contents: &'a str, name: &str) -> Option<&'a str> {
    let directive = format!("#define {}", name);
    contents
        .lines()
        .find(|l| l.trim_start().starts_with(&directive) && l.split_whitespace().nth(1) == Some(name))
        .and_then(|l| l.split('"').nth(1))
}

fn export_credentials() -> anyhow::Result<()> {
    let wifi_config_path = "wifi_config.h";
    println!("cargo:rerun-if-changed={}", wifi_config_path);

    if Path::new(wifi_config_path).exists() {
        let contents = fs::read_to_string(wifi_config_path)?;

        let ssid = define_value(&contents, "WIFI_SSID").unwrap_or(SENTINEL);
        let password = define_value(&contents, "WIFI_PASSWORD").unwrap_or(SENTINEL);
        let ap_password = define_value(&contents, "AP_PASSWORD").unwrap_or("");

        println!("cargo:rustc-env=WIFI_SSID={}", ssid);
        println!("cargo:rustc-env=WIFI_PASSWORD={}", password);
        println!("cargo:rustc-env=AP_PASSWORD={}", ap_password);
    } else {
        println!("cargo:rustc-env=WIFI_SSID={}", SENTINEL);
        println!("cargo:rustc-env=WIFI_PASSWORD={}", SENTINEL);
        println!("cargo:rustc-env=AP_PASSWORD=");
        println!("cargo:warning=wifi_config.h not found, building access-point-only firmware. Copy wifi_config.h.example to wifi_config.h to add an uplink.");
    }

    Ok(())
}
