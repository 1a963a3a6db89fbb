use serde_json::{json, Value};

/// Builds a register job body: `{ node: {...}, run_list: [...] }`.
#[derive(Debug, Clone)]
pub struct RegisterBuilder {
    node_name: Option<String>,
    local_ipv4: Option<String>,
    tags: Vec<String>,
    run_list: Option<Vec<String>>,
}

impl RegisterBuilder {
    /// A node with an address and an empty run list.
    pub fn new(node_name: &str) -> Self {
        Self {
            node_name: Some(node_name.to_string()),
            local_ipv4: Some("10.0.0.5".to_string()),
            tags: Vec::new(),
            run_list: Some(Vec::new()),
        }
    }

    pub fn ip(mut self, ip: &str) -> Self {
        self.local_ipv4 = Some(ip.to_string());
        self
    }

    pub fn without_ip(mut self) -> Self {
        self.local_ipv4 = None;
        self
    }

    pub fn tag(mut self, tag: &str) -> Self {
        self.tags.push(tag.to_string());
        self
    }

    pub fn run_list(mut self, items: &[&str]) -> Self {
        self.run_list = Some(items.iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn without_run_list(mut self) -> Self {
        self.run_list = None;
        self
    }

    pub fn build(self) -> Value {
        let mut node = json!({ "tags": self.tags });
        if let Some(name) = self.node_name {
            node["node_name"] = json!(name);
        }
        if let Some(ip) = self.local_ipv4 {
            node["local_ipv4"] = json!(ip);
        }
        let mut payload = json!({ "node": node });
        if let Some(run_list) = self.run_list {
            payload["run_list"] = json!(run_list);
        }
        payload
    }
}

pub fn unregister_payload(node_name: &str) -> Value {
    json!({ "node_name": node_name })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_shape() {
        let payload = RegisterBuilder::new("web01")
            .tag("client:acme")
            .run_list(&["role[web]"])
            .build();
        assert_eq!(payload["node"]["node_name"], "web01");
        assert_eq!(payload["node"]["local_ipv4"], "10.0.0.5");
        assert_eq!(payload["node"]["tags"][0], "client:acme");
        assert_eq!(payload["run_list"][0], "role[web]");
    }

    #[test]
    fn test_omitted_fields() {
        let payload = RegisterBuilder::new("web01").without_ip().without_run_list().build();
        assert!(payload["node"].get("local_ipv4").is_none());
        assert!(payload.get("run_list").is_none());
    }
}
