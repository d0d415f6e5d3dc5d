use lmc_feed::LiveViewConfig;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct Config {
    pub debug: bool,
    pub state_dir: PathBuf,
    pub feed: LiveViewConfig,
}

/// Flags shared by every subcommand. Empty strings and zero durations mean
/// "not given" so the environment can fill them in.
#[derive(clap::Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    #[arg(long, global = true, default_value_t = false)]
    pub debug: bool,
    #[arg(long, global = true, default_value = "")]
    pub state_dir: String,
    #[arg(long, global = true, default_value_t = 0)]
    pub dedup_window_ms: u64,
    #[arg(long, global = true, default_value_t = 0)]
    pub highlight_ms: u64,
    #[arg(long, global = true, default_value_t = 0)]
    pub refetch_window_ms: u64,
    /// Use the dashboard's shorter re-sync window.
    #[arg(long, global = true, default_value_t = false)]
    pub dashboard: bool,
}

pub fn load_config(args: &GlobalArgs) -> Config {
    let base = if args.dashboard {
        LiveViewConfig::dashboard()
    } else {
        LiveViewConfig::list()
    };
    let dedup_window = resolve_duration_ms(
        args.dedup_window_ms,
        env_value("LMC_DEDUP_WINDOW_MS"),
        base.dedup_window,
    );
    let feed = LiveViewConfig {
        dedup_window,
        purge_interval: dedup_window,
        highlight_duration: resolve_duration_ms(
            args.highlight_ms,
            env_value("LMC_HIGHLIGHT_MS"),
            base.highlight_duration,
        ),
        coalesce_window: resolve_duration_ms(
            args.refetch_window_ms,
            env_value("LMC_REFETCH_WINDOW_MS"),
            base.coalesce_window,
        ),
        ..base
    };
    let debug = args.debug
        || env_value("LMC_DEBUG")
            .and_then(|value| parse_bool_flag(&value))
            .unwrap_or(false);

    Config {
        debug,
        state_dir: resolve_state_dir(&args.state_dir),
        feed,
    }
}

pub fn parse_bool_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

fn resolve_duration_ms(flag_ms: u64, env: Option<String>, default: Duration) -> Duration {
    if flag_ms > 0 {
        return Duration::from_millis(flag_ms);
    }
    env.and_then(|value| value.trim().parse::<u64>().ok())
        .filter(|ms| *ms > 0)
        .map(Duration::from_millis)
        .unwrap_or(default)
}

fn resolve_state_dir(flag: &str) -> PathBuf {
    if !flag.trim().is_empty() {
        return PathBuf::from(flag);
    }
    if let Some(value) = env_value("LMC_STATE_DIR") {
        return PathBuf::from(value);
    }
    if let Some(value) = env_value("XDG_STATE_HOME") {
        return PathBuf::from(value).join("lmc");
    }
    if let Some(value) = env_value("HOME") {
        return PathBuf::from(value)
            .join(".local")
            .join("state")
            .join("lmc");
    }
    PathBuf::from(".lmc/state")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_bool_flag_accepts_common_values() {
        assert_eq!(parse_bool_flag("1"), Some(true));
        assert_eq!(parse_bool_flag(" Yes "), Some(true));
        assert_eq!(parse_bool_flag("off"), Some(false));
        assert_eq!(parse_bool_flag("maybe"), None);
    }

    #[test]
    fn flag_beats_env_beats_default() {
        let default = Duration::from_secs(8);
        assert_eq!(
            resolve_duration_ms(500, Some("900".to_string()), default),
            Duration::from_millis(500)
        );
        assert_eq!(
            resolve_duration_ms(0, Some(" 900 ".to_string()), default),
            Duration::from_millis(900)
        );
        assert_eq!(resolve_duration_ms(0, Some("soon".to_string()), default), default);
        assert_eq!(resolve_duration_ms(0, Some("0".to_string()), default), default);
        assert_eq!(resolve_duration_ms(0, None, default), default);
    }

    #[test]
    fn explicit_state_dir_wins() {
        assert_eq!(resolve_state_dir("/tmp/lmc-test"), PathBuf::from("/tmp/lmc-test"));
    }
}
