use chrono::{DateTime, Utc};

pub fn utc_now() -> DateTime<Utc> {
    Utc::now()
}

/// CRM team ids arrive padded or empty; blank means "no team".
pub fn normalize_team_id(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim).filter(|id| !id.is_empty()).map(str::to_owned)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_team_id() {
        assert_eq!(normalize_team_id(None), None);
        assert_eq!(normalize_team_id(Some("  ")), None);
        assert_eq!(normalize_team_id(Some(" T1 ")), Some("T1".to_string()));
    }
}
