//! Field layout of an application load balancer access log entry.
//!
//! See https://docs.aws.amazon.com/elasticloadbalancing/latest/application/load-balancer-access-logs.html#access-log-entry-syntax
//! The three classifications are independent: a field may be quoted and dropped at the same time.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    pub name: &'static str,
    /// Wrapped in double quotes, may contain spaces and escape sequences.
    pub quoted: bool,
    /// Written without quotes in JSON output.
    pub numeric: bool,
    /// Never written to the output.
    pub dropped: bool,
}

const fn plain(name: &'static str) -> Field {
    Field {
        name,
        quoted: false,
        numeric: false,
        dropped: false,
    }
}

const fn number(name: &'static str) -> Field {
    Field {
        numeric: true,
        ..plain(name)
    }
}

const fn quoted(name: &'static str) -> Field {
    Field {
        quoted: true,
        ..plain(name)
    }
}

const fn dropped(field: Field) -> Field {
    Field {
        dropped: true,
        ..field
    }
}

pub const FIELD_COUNT: usize = 30;

pub const TIME_FIELD: usize = 1;

pub static FIELDS: [Field; FIELD_COUNT] = [
    plain("type"),
    plain("time"),
    plain("elb"),
    plain("client"),
    plain("target"),
    number("request_processing_time"),
    number("target_processing_time"),
    number("response_processing_time"),
    number("elb_status_code"),
    number("target_status_code"),
    number("received_bytes"),
    number("sent_bytes"),
    quoted("request"),
    quoted("user_agent"),
    plain("ssl_cipher"),
    plain("ssl_protocol"),
    dropped(plain("target_group_arn")), // not configured directly
    quoted("trace_id"),
    quoted("domain_name"),
    dropped(quoted("chosen_cert_arn")), // hardcoded in ingress
    dropped(plain("matched_rule_priority")), // not configured directly
    plain("request_creation_time"),
    quoted("actions_executed"),
    quoted("redirect_url"),
    dropped(quoted("error_reason")), // only for lambda
    dropped(quoted("targets")),      // same as target
    dropped(quoted("target_status_code_list")), // same as target_status_code
    dropped(quoted("classification")),
    dropped(quoted("classification_reason")),
    dropped(plain("conn_trace_id")), // only for connection logs
];
