pub mod history;
pub mod live;
pub mod login;

use std::path::Path;

use plantwatch_core::{PlantConfig, TelemetryError, TokenStore};

/// Environment variable consulted when no `--token` is given.
pub const TOKEN_ENV: &str = "PLANTWATCH_TOKEN";

/// One displayed metric.
pub struct MetricSpec {
    pub key: &'static str,
    pub label: &'static str,
    pub unit: &'static str,
    pub digits: usize,
}

/// A titled group of metrics, as laid out on the plant dashboard.
pub struct Section {
    pub title: &'static str,
    pub metrics: &'static [MetricSpec],
}

const fn metric(
    key: &'static str,
    label: &'static str,
    unit: &'static str,
    digits: usize,
) -> MetricSpec {
    MetricSpec {
        key,
        label,
        unit,
        digits,
    }
}

/// Every charted metric, grouped by plant section.
pub const SECTIONS: &[Section] = &[
    Section {
        title: "Reactor Temps",
        metrics: &[
            metric("temp_T1", "T1", "°C", 1),
            metric("temp_T2", "T2", "°C", 1),
            metric("temp_T3", "T3", "°C", 1),
            metric("temp_T4", "T4", "°C", 1),
            metric("temp_T5", "T5", "°C", 1),
        ],
    },
    Section {
        title: "Heat Output",
        metrics: &[
            metric("flow_rate", "Flow rate", "m³/h", 2),
            metric("fore_flow_temp", "Fore", "°C", 1),
            metric("return_flow_temp", "Return", "°C", 1),
            metric("delta_t", "ΔT", "°C", 2),
            metric("heat_output", "Heat output", "kW", 1),
        ],
    },
    Section {
        title: "Exhaust Gas",
        metrics: &[
            metric("gas_temp", "Gas temp", "°C", 1),
            metric("fan_speed", "Fan speed", "", 1),
            metric("o2_percent", "O₂", "%", 2),
            metric("gas_pressure", "Gas pressure", "µbar", 2),
        ],
    },
    Section {
        title: "Buffer Tank",
        metrics: &[
            metric("buffer_lower_temp", "Lower", "°C", 1),
            metric("buffer_upper_temp", "Upper", "°C", 1),
        ],
    },
];

/// Format a possibly-unreported value; absent values print as "—".
pub fn fmt_value(value: Option<f64>, digits: usize) -> String {
    match value {
        Some(v) if v.is_finite() => format!("{v:.digits$}"),
        _ => "—".to_string(),
    }
}

/// Load the config file (if any) and apply flag overrides. Exits on error.
pub fn load_config(path: Option<&str>, base_url: Option<&str>) -> PlantConfig {
    let mut config = match path {
        Some(p) => match PlantConfig::load(Path::new(p)) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Error loading config {p}: {e}");
                std::process::exit(1);
            }
        },
        None => PlantConfig::default(),
    };

    if let Some(url) = base_url {
        config.base_url = url.trim_end_matches('/').to_string();
    }
    if let Err(e) = config.validate() {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
    config
}

/// Credential lookup: `--token`, then `PLANTWATCH_TOKEN`, then the token file.
pub fn resolve_token(config: &PlantConfig, flag: Option<&str>) -> Option<String> {
    let present = |t: &String| !t.trim().is_empty();
    let explicit = flag
        .map(str::to_string)
        .filter(present)
        .or_else(|| std::env::var(TOKEN_ENV).ok().filter(present));
    if explicit.is_some() {
        return explicit;
    }

    let store = TokenStore::new(config.token_path());
    match store.load() {
        Ok(token) => token,
        Err(e) => {
            log::warn!("could not read token file {}: {e}", store.path().display());
            None
        }
    }
}

/// A multi-threaded runtime for one command. Exits on failure.
pub fn runtime() -> tokio::runtime::Runtime {
    match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error starting async runtime: {e}");
            std::process::exit(1);
        }
    }
}

/// Print an error the way every command does, with a hint for auth failures.
pub fn report_error(context: &str, err: &TelemetryError) {
    eprintln!("Error: {context}: {err}");
    if let Some(hint) = error_hint(err) {
        eprintln!("Hint: {hint}");
    }
}

fn error_hint(err: &TelemetryError) -> Option<&'static str> {
    match err {
        TelemetryError::Auth(_) => {
            Some("run `plantwatch login --email <EMAIL> --password <PASSWORD>` first")
        }
        e if e.is_transient() => Some("the backend may be unavailable; check --base-url and retry"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // -----------------------------------------------------------------------
    // fmt_value tests
    // -----------------------------------------------------------------------

    #[test]
    fn test_fmt_value_absent_is_dash() {
        assert_eq!(fmt_value(None, 1), "—");
        assert_eq!(fmt_value(Some(f64::NAN), 1), "—");
    }

    #[test]
    fn test_fmt_value_zero_is_shown() {
        assert_eq!(fmt_value(Some(0.0), 1), "0.0");
        assert_eq!(fmt_value(Some(6.126), 2), "6.13");
    }

    // -----------------------------------------------------------------------
    // error_hint tests
    // -----------------------------------------------------------------------

    #[test]
    fn test_hints_follow_error_kind() {
        let auth = error_hint(&TelemetryError::Auth("no credential configured".into()));
        assert!(auth.unwrap().contains("plantwatch login"));

        let down = error_hint(&TelemetryError::Network("connection refused".into()));
        assert!(down.unwrap().contains("retry"));
        let gateway = TelemetryError::Server {
            status: 502,
            detail: "bad gateway".into(),
        };
        assert!(error_hint(&gateway).unwrap().contains("retry"));

        assert!(error_hint(&TelemetryError::Config("bad window".into())).is_none());
    }

    // -----------------------------------------------------------------------
    // Catalog tests
    // -----------------------------------------------------------------------

    #[test]
    fn test_sections_cover_every_charted_metric_once() {
        let mut keys: Vec<&str> = SECTIONS
            .iter()
            .flat_map(|s| s.metrics.iter().map(|m| m.key))
            .collect();
        assert_eq!(keys.len(), 16);
        keys.sort_unstable();
        keys.dedup();
        assert_eq!(keys.len(), 16);
    }

    // -----------------------------------------------------------------------
    // Token resolution tests
    // -----------------------------------------------------------------------

    #[test]
    fn test_flag_token_wins_over_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token");
        TokenStore::new(&path).save("from-file").unwrap();
        let config = PlantConfig {
            token_path: Some(path),
            ..Default::default()
        };
        assert_eq!(
            resolve_token(&config, Some("from-flag")).as_deref(),
            Some("from-flag")
        );
    }

    #[test]
    fn test_blank_flag_falls_through() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token");
        TokenStore::new(&path).save("from-file").unwrap();
        let config = PlantConfig {
            token_path: Some(path),
            ..Default::default()
        };
        // PLANTWATCH_TOKEN may be set in the environment running the tests.
        let expected = std::env::var(TOKEN_ENV)
            .ok()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| "from-file".to_string());
        assert_eq!(resolve_token(&config, Some("  ")), Some(expected));
    }
}
