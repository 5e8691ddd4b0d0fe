use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::prizepicks_fetch::DEFAULT_LEAGUE_ID;
use crate::prop_table::SortKey;
use crate::resolver::RiskyMatchPolicy;
use crate::store;

const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 10;
const DEFAULT_FETCH_PARALLELISM: usize = 3;
const DEFAULT_OUTPUT_PATH: &str = "props.xlsx";

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub db_path: Option<PathBuf>,
    pub output_path: PathBuf,
    pub prizepicks_league_id: String,
    pub prizepicks_enabled: bool,
    pub underdog_enabled: bool,
    pub bovado_enabled: bool,
    pub fetch_timeout: Duration,
    pub fetch_parallelism: usize,
    pub risky_match_policy: RiskyMatchPolicy,
    pub sort_by: Vec<SortKey>,
}

impl PipelineConfig {
    pub fn from_env() -> Self {
        let db_path = env_string("PROPS_DB_PATH")
            .map(PathBuf::from)
            .or_else(store::default_db_path);
        let output_path = env_string("PROPS_OUTPUT_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_PATH));
        let prizepicks_league_id =
            env_string("PRIZEPICKS_LEAGUE_ID").unwrap_or_else(|| DEFAULT_LEAGUE_ID.to_string());
        let fetch_timeout_secs = env::var("FETCH_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.trim().parse::<u64>().ok())
            .unwrap_or(DEFAULT_FETCH_TIMEOUT_SECS)
            .clamp(2, 60);
        let fetch_parallelism = env::var("FETCH_PARALLELISM")
            .ok()
            .and_then(|v| v.trim().parse::<usize>().ok())
            .unwrap_or(DEFAULT_FETCH_PARALLELISM)
            .clamp(1, 8);
        let risky_match_policy = env_string("RISKY_MATCH_POLICY")
            .and_then(|v| RiskyMatchPolicy::parse(&v))
            .unwrap_or_default();
        let sort_by = env_string("PROPS_SORT")
            .map(|v| parse_sort_keys(&v))
            .filter(|keys| !keys.is_empty())
            .unwrap_or_else(SortKey::defaults);

        Self {
            db_path,
            output_path,
            prizepicks_league_id,
            prizepicks_enabled: env_bool("PRIZEPICKS_ENABLED", true),
            underdog_enabled: env_bool("UNDERDOG_ENABLED", true),
            bovado_enabled: env_bool("BOVADA_ENABLED", true),
            fetch_timeout: Duration::from_secs(fetch_timeout_secs),
            fetch_parallelism,
            risky_match_policy,
            sort_by,
        }
    }
}

/// Comma-separated sort columns; unknown names are ignored.
pub fn parse_sort_keys(raw: &str) -> Vec<SortKey> {
    raw.split(',').filter_map(SortKey::parse).collect()
}

/// Value of `--flag <path>` or `--flag=<path>`; blank values are skipped.
pub fn path_arg(args: &[String], flag: &str) -> Option<PathBuf> {
    let prefix = format!("{flag}=");
    for (idx, arg) in args.iter().enumerate() {
        if let Some(path) = arg.strip_prefix(&prefix) {
            let trimmed = path.trim();
            if !trimmed.is_empty() {
                return Some(PathBuf::from(trimmed));
            }
        }
        if arg == flag
            && let Some(next) = args.get(idx + 1)
            && !next.trim().is_empty()
        {
            return Some(PathBuf::from(next.trim()));
        }
    }
    None
}

/// Arguments that are not flags and do not follow one of `value_flags`.
pub fn positional_args(args: &[String], value_flags: &[&str]) -> Vec<PathBuf> {
    let mut out = Vec::new();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if value_flags.contains(&arg.as_str()) {
            iter.next();
        } else if !arg.starts_with("--") {
            out.push(PathBuf::from(arg));
        }
    }
    out
}

fn env_string(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn env_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .ok()
        .map(|v| {
            let t = v.trim().to_ascii_lowercase();
            !(t.is_empty() || t == "0" || t == "false" || t == "off" || t == "no")
        })
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sort_keys_skip_unknown_names() {
        assert_eq!(
            parse_sort_keys("edge, Player ,bogus"),
            vec![SortKey::Edge, SortKey::Player]
        );
        assert!(parse_sort_keys("").is_empty());
    }

    fn args(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn path_flags_accept_both_spellings() {
        let a = args(&["--db", "stats.db", "--out=week.xlsx"]);
        assert_eq!(path_arg(&a, "--db"), Some(PathBuf::from("stats.db")));
        assert_eq!(path_arg(&a, "--out"), Some(PathBuf::from("week.xlsx")));
        assert_eq!(path_arg(&args(&["--db=  ", "--db"]), "--db"), None);
    }

    #[test]
    fn positional_args_skip_flag_values() {
        let a = args(&["a.json", "--db", "stats.db", "--verbose", "b.json", "--db=x.db"]);
        assert_eq!(
            positional_args(&a, &["--db"]),
            vec![PathBuf::from("a.json"), PathBuf::from("b.json")]
        );
    }
}
