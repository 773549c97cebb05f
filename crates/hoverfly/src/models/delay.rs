//! Pattern-indexed response delays.
//!
//! Delays are applied after a response has been selected and before it is
//! written back to the client. The first rule (insertion order) whose
//! pattern matches wins; Capture mode bypasses the list entirely.

use super::request::RequestDetails;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseDelay {
    pub url_pattern: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub http_method: String,
    #[serde(alias = "delayMs")]
    pub delay: u64,
}

impl ResponseDelay {
    /// The string the pattern is evaluated against: the request URL,
    /// prefixed with `METHOD ` when this rule also constrains the method.
    fn target_for(&self, request: &RequestDetails) -> String {
        let mut url = request.base_url();
        if !request.query.is_empty() {
            url = format!("{url}?{}", request.query);
        }
        if self.http_method.is_empty() {
            url
        } else {
            format!("{} {url}", request.method)
        }
    }

    fn matches(&self, request: &RequestDetails) -> bool {
        if !self.http_method.is_empty() && self.http_method != request.method {
            return false;
        }
        match Regex::new(&self.url_pattern) {
            Ok(re) => re.is_match(&self.target_for(request)),
            Err(_) => false,
        }
    }

    pub async fn execute(&self) {
        tokio::time::sleep(Duration::from_millis(self.delay)).await;
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponseDelayList(Vec<ResponseDelay>);

impl ResponseDelayList {
    pub fn new(delays: Vec<ResponseDelay>) -> Self {
        ResponseDelayList(delays)
    }

    /// First matching rule in insertion order, if any.
    pub fn get_delay(&self, request: &RequestDetails) -> Option<&ResponseDelay> {
        self.0.iter().find(|delay| delay.matches(request))
    }

    pub fn rules(&self) -> &[ResponseDelay] {
        &self.0
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(method: &str, destination: &str, path: &str) -> RequestDetails {
        RequestDetails {
            scheme: "http".to_string(),
            method: method.to_string(),
            destination: destination.to_string(),
            path: path.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_first_matching_rule_wins() {
        let delays = ResponseDelayList::new(vec![
            ResponseDelay {
                url_pattern: "example\\.com".to_string(),
                http_method: String::new(),
                delay: 100,
            },
            ResponseDelay {
                url_pattern: ".*".to_string(),
                http_method: String::new(),
                delay: 200,
            },
        ]);

        let delay = delays.get_delay(&request("GET", "example.com", "/slow"));
        assert_eq!(delay.unwrap().delay, 100);
    }

    #[test]
    fn test_method_constraint_requires_equality() {
        let delays = ResponseDelayList::new(vec![ResponseDelay {
            url_pattern: ".*".to_string(),
            http_method: "POST".to_string(),
            delay: 100,
        }]);

        assert!(delays.get_delay(&request("GET", "example.com", "/")).is_none());
        assert!(delays.get_delay(&request("POST", "example.com", "/")).is_some());
    }

    #[test]
    fn test_pattern_sees_full_url_with_path() {
        let delays = ResponseDelayList::new(vec![ResponseDelay {
            url_pattern: "example\\.com/slow".to_string(),
            http_method: String::new(),
            delay: 250,
        }]);

        assert!(delays.get_delay(&request("GET", "example.com", "/slow")).is_some());
        assert!(delays.get_delay(&request("GET", "example.com", "/fast")).is_none());
    }

    #[test]
    fn test_no_rules_means_no_delay() {
        let delays = ResponseDelayList::default();
        assert!(delays.get_delay(&request("GET", "example.com", "/")).is_none());
    }
}
