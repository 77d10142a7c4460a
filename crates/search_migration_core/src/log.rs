//! Line-delimited JSON logging on stderr, one object per event.

use serde_json::{json, Value};

pub fn log_info(component: &str, event: &str, details: Value) {
    eprintln!("{}", info_line(component, event, details));
}

pub fn log_warn(component: &str, event: &str, details: Value) {
    eprintln!("{}", leveled_line(component, "warn", event, details));
}

pub fn log_error(component: &str, event: &str, details: Value) {
    eprintln!("{}", leveled_line(component, "error", event, details));
}

fn info_line(component: &str, event: &str, details: Value) -> Value {
    json!({
        "component": component,
        "event": event,
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "details": details,
    })
}

fn leveled_line(component: &str, level: &str, event: &str, details: Value) -> Value {
    json!({
        "component": component,
        "level": level,
        "event": event,
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "details": details,
    })
}
