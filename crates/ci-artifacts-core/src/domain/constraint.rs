use std::collections::{
    BTreeMap,
    BTreeSet,
};
use std::fmt;
use std::str::FromStr;

use chrono::{
    DateTime,
    TimeZone,
    Utc,
};
use ci_artifacts_api::{
    CiError,
    ParamValue,
    ParameterSet,
};
use ci_artifacts_jenkins::DEPENDENCY_HASHES_PARAM;

use super::fingerprint::encode_path_hashes;

pub const DEFAULT_MAX_BUILDS: usize = 50;

/// Which build start times are acceptable for a match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeWindow {
    /// Started on the current local calendar day
    #[default]
    Today,
    Any,
    /// Started no longer ago than the given duration
    Within(chrono::Duration),
}

impl TimeWindow {
    pub fn contains<Tz: TimeZone>(&self, started: DateTime<Utc>, now: &DateTime<Tz>) -> bool {
        match self {
            TimeWindow::Any => true,
            TimeWindow::Today => {
                started.with_timezone(&now.timezone()).date_naive() == now.date_naive()
            }
            TimeWindow::Within(max_age) => now.with_timezone(&Utc) - started <= *max_age,
        }
    }
}

impl FromStr for TimeWindow {
    type Err = CiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        match s.as_str() {
            "today" => return Ok(TimeWindow::Today),
            "any" | "none" | "" => return Ok(TimeWindow::Any),
            _ => {}
        }

        let invalid = || {
            CiError::ParameterFormat(format!(
                "time constraint '{s}' is not one of today, any, <N>h or <N>d"
            ))
        };
        let unit_at = s.char_indices().last().map_or(0, |(i, _)| i);
        let (amount, unit) = s.split_at(unit_at);
        let amount: i64 = amount.parse().map_err(|_| invalid())?;
        if amount <= 0 {
            return Err(invalid());
        }
        let max_age = match unit {
            "h" => chrono::Duration::try_hours(amount),
            "d" => chrono::Duration::try_days(amount),
            _ => None,
        };
        max_age.map(TimeWindow::Within).ok_or_else(invalid)
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeWindow::Today => write!(f, "today"),
            TimeWindow::Any => write!(f, "any"),
            TimeWindow::Within(d) if d.num_hours() % 24 == 0 => write!(f, "{}d", d.num_days()),
            TimeWindow::Within(d) => write!(f, "{}h", d.num_hours()),
        }
    }
}

/// What a build has to look like to be reused instead of triggering a new one
#[derive(Debug, Clone, PartialEq)]
pub struct MatchConstraint {
    /// Checked parameters, these have to match
    pub params: ParameterSet,
    /// Only sent when triggering
    pub params_no_check: ParameterSet,
    pub ignore: BTreeSet<String>,
    pub time_window: TimeWindow,
    /// Fingerprint of the caller's dependency paths, `None` if not requested
    pub path_hashes: Option<BTreeMap<String, String>>,
    pub force_new_build: bool,
    /// Upper bound of builds inspected per lookup
    pub max_builds: usize,
}

impl MatchConstraint {
    pub fn new(params: ParameterSet) -> Self {
        Self {
            params,
            params_no_check: ParameterSet::new(),
            ignore: BTreeSet::from(["DISABLE_CACHE".to_string()]),
            time_window: TimeWindow::default(),
            path_hashes: None,
            force_new_build: false,
            max_builds: DEFAULT_MAX_BUILDS,
        }
    }

    /// Unchecked parameters plus the encoded dependency fingerprint
    pub fn unchecked_params(&self) -> ParameterSet {
        let mut unchecked = self.params_no_check.clone();
        if let Some(hashes) = &self.path_hashes {
            unchecked.insert(
                DEPENDENCY_HASHES_PARAM,
                ParamValue::Text(encode_path_hashes(hashes)),
            );
        }
        unchecked
    }

    /// Re-normalizes both parameter sets once the job's boolean parameters
    /// are known
    pub fn with_boolean_params(&self, boolean_keys: &BTreeSet<String>) -> Self {
        Self {
            params: self.params.normalized(boolean_keys),
            params_no_check: self.params_no_check.normalized(boolean_keys),
            ..self.clone()
        }
    }

    /// Everything a triggered build would be started with
    pub fn trigger_params(&self) -> ParameterSet {
        self.params.merged(&self.unchecked_params())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    #[test]
    fn test_parse_time_window() {
        assert_eq!("today".parse::<TimeWindow>().unwrap(), TimeWindow::Today);
        assert_eq!("None".parse::<TimeWindow>().unwrap(), TimeWindow::Any);
        assert_eq!(
            "12h".parse::<TimeWindow>().unwrap(),
            TimeWindow::Within(chrono::Duration::hours(12))
        );
        assert_eq!(
            "3d".parse::<TimeWindow>().unwrap().to_string(),
            "3d".to_string()
        );
        assert!("yesterday".parse::<TimeWindow>().is_err());
        assert!("0h".parse::<TimeWindow>().is_err());
        assert!("h".parse::<TimeWindow>().is_err());
        assert!(matches!(
            "3000000000000h".parse::<TimeWindow>(),
            Err(CiError::ParameterFormat(_))
        ));
        assert!("9999999999999d".parse::<TimeWindow>().is_err());
    }

    #[test]
    fn test_today_compares_calendar_dates() {
        let now = at(2024, 5, 17, 9);
        assert!(TimeWindow::Today.contains(at(2024, 5, 17, 0), &now));
        assert!(!TimeWindow::Today.contains(at(2024, 5, 16, 23), &now));
        assert!(TimeWindow::Any.contains(at(2001, 1, 1, 0), &now));
    }

    #[test]
    fn test_within_window() {
        let now = at(2024, 5, 17, 9);
        let window = TimeWindow::Within(chrono::Duration::hours(12));
        assert!(window.contains(at(2024, 5, 16, 22), &now));
        assert!(!window.contains(at(2024, 5, 16, 20), &now));
    }

    #[test]
    fn test_trigger_params_carry_path_hashes() {
        let mut params = ParameterSet::new();
        params.insert("EDITION", ParamValue::Text("raw".into()));
        let mut constraint = MatchConstraint::new(params);
        constraint
            .params_no_check
            .insert("CIPARAM_CLEANUP", ParamValue::Bool(true));
        constraint.path_hashes = Some(BTreeMap::from([
            ("agents".to_string(), "ab12".to_string()),
            ("omd".to_string(), "cd34".to_string()),
        ]));

        let trigger = constraint.trigger_params();
        assert_eq!(trigger.len(), 3);
        assert_eq!(
            trigger.get(DEPENDENCY_HASHES_PARAM),
            Some(&ParamValue::Text("agents=ab12,omd=cd34".into()))
        );
        assert!(!constraint.params.contains_key(DEPENDENCY_HASHES_PARAM));
    }
}
