use anyhow::Result;

use crate::state::{Mode, Settings};

/// Show the active configuration
pub fn status(settings: &Settings) -> Result<()> {
    println!("{}", summary(settings));
    Ok(())
}

fn summary(settings: &Settings) -> String {
    let endpoint = match settings.mode {
        Mode::Remote => format!(
            "Mode: remote · Endpoint: {} · API key: {}",
            settings.remote_api_url,
            if settings.has_api_key() { "set" } else { "not set" }
        ),
        Mode::Local => format!("Mode: local · Endpoint: {}", settings.local_server_url),
    };
    format!(
        "{}\nModel: {}\nCache: {:?} (ttl {}s, error ttl {}s)",
        endpoint,
        settings.model,
        settings.data_dir,
        settings.ttl.ttl.num_seconds(),
        settings.ttl.error_ttl.num_seconds()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_never_prints_the_key() {
        let settings = Settings {
            remote_api_key: "sk-secret".to_string(),
            ..Settings::default()
        };
        let text = summary(&settings);
        assert!(text.contains("API key: set"));
        assert!(!text.contains("sk-secret"));
    }

    #[test]
    fn test_summary_local_mode() {
        let settings = Settings {
            mode: Mode::Local,
            ..Settings::default()
        };
        assert!(summary(&settings).starts_with("Mode: local · Endpoint: http://localhost:5000/generate"));
    }
}
