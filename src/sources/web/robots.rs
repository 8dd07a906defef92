//! Minimal robots.txt support: `Disallow` rules for the wildcard user-agent.

use reqwest::Client;
use std::time::Duration;

/// Disallow prefixes that apply to user-agent `*`.
pub(crate) struct RobotsTxt {
    disallow: Vec<String>,
}

impl RobotsTxt {
    /// Fetch and parse `robots.txt` for an origin; any failure yields `None` and the
    /// crawl proceeds unrestricted.
    pub(crate) async fn fetch(client: &Client, origin: &str) -> Option<Self> {
        let url = format!("{origin}/robots.txt");
        let response = client
            .get(&url)
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .ok()?;
        if !response.status().is_success() {
            return None;
        }
        let body = response.text().await.ok()?;
        Some(Self::parse(&body))
    }

    /// Parse the rule groups, keeping `Disallow` lines from groups naming `*`.
    pub(crate) fn parse(body: &str) -> Self {
        let mut disallow = Vec::new();
        let mut group_applies = false;
        let mut reading_agents = false;

        for line in body.lines() {
            let line = line.split('#').next().unwrap_or_default().trim();
            if line.is_empty() {
                continue;
            }
            if let Some(agent) = strip_field(line, "user-agent") {
                if !reading_agents {
                    group_applies = false;
                }
                reading_agents = true;
                if agent == "*" {
                    group_applies = true;
                }
                continue;
            }
            reading_agents = false;
            if let Some(path) = strip_field(line, "disallow") {
                if group_applies && !path.is_empty() {
                    disallow.push(path.to_string());
                }
            }
        }

        Self { disallow }
    }

    /// Whether the wildcard rules allow fetching this path.
    pub(crate) fn allows(&self, path: &str) -> bool {
        !self
            .disallow
            .iter()
            .any(|prefix| path.starts_with(prefix.as_str()))
    }
}

fn strip_field<'a>(line: &'a str, field: &str) -> Option<&'a str> {
    let (name, value) = line.split_once(':')?;
    if name.trim().eq_ignore_ascii_case(field) {
        Some(value.trim())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_group_rules_apply() {
        let robots = RobotsTxt::parse(
            "User-agent: googlebot\nDisallow: /private\n\nUser-agent: *\nDisallow: /admin\nDisallow: /tmp\n",
        );
        assert!(robots.allows("/docs/page"));
        assert!(!robots.allows("/admin/panel"));
        assert!(!robots.allows("/tmp"));
        // Rules for other agents do not apply to us.
        assert!(robots.allows("/private"));
    }

    #[test]
    fn stacked_agents_share_a_group() {
        let robots = RobotsTxt::parse("User-agent: a\nUser-agent: *\nDisallow: /x\n");
        assert!(!robots.allows("/x"));
    }

    #[test]
    fn empty_disallow_means_allow_everything() {
        let robots = RobotsTxt::parse("User-agent: *\nDisallow:\n");
        assert!(robots.allows("/anything"));
    }

    #[test]
    fn comments_are_ignored() {
        let robots = RobotsTxt::parse("User-agent: * # everyone\nDisallow: /hidden # secret\n");
        assert!(!robots.allows("/hidden/page"));
    }
}
