use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

// https://docs.aws.amazon.com/elasticloadbalancing/latest/application/load-balancer-access-logs.html#access-log-file-format
// bucket[/prefix]/AWSLogs/aws-account-id/elasticloadbalancing/region/yyyy/mm/dd/aws-account-id_elasticloadbalancing_region_app.load-balancer-id_end-time_ip-address_random-string.log.gz
static KEY_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"AWSLogs/(?P<account_id>\d+)/elasticloadbalancing/(?P<region>[\w-]+)/(?P<year>\d+)/(?P<month>\d+)/(?P<day>\d+)/\d+_elasticloadbalancing_(?:\w+-\w+-(?:\w+-)?\d)_app\.(?P<id>[a-zA-Z0-9\-]+)\..+\.log\.gz",
    )
    .unwrap()
});

/// An access log object in the source bucket, together with what its key tells us about it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectKey {
    pub key: String,
    pub account_id: String,
    pub region: String,
    pub date: String, // yyyy/mm/dd
    pub load_balancer: String,
}

impl ObjectKey {
    /// Returns `None` for keys that are not application load balancer access logs.
    pub fn parse(key: &str) -> Option<Self> {
        let captures = KEY_REGEX.captures(key)?;
        Some(Self {
            key: key.to_owned(),
            account_id: captures["account_id"].to_owned(),
            region: captures["region"].to_owned(),
            date: format!(
                "{}/{}/{}",
                &captures["year"], &captures["month"], &captures["day"]
            ),
            load_balancer: captures["id"].to_owned(),
        })
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}
