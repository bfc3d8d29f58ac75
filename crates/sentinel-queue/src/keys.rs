//! Redis key construction. Everything the service writes lives under the
//! `sentinel:` prefix so a shared broker stays navigable.

pub fn job(id: &str) -> String {
    format!("sentinel:job:{id}")
}

pub fn waiting(queue: &str) -> String {
    format!("sentinel:queue:{queue}:waiting")
}

pub fn active(queue: &str) -> String {
    format!("sentinel:queue:{queue}:active")
}

pub fn delayed(queue: &str) -> String {
    format!("sentinel:queue:{queue}:delayed")
}

pub fn completed(queue: &str) -> String {
    format!("sentinel:queue:{queue}:completed")
}

pub fn failed(queue: &str) -> String {
    format!("sentinel:queue:{queue}:failed")
}
