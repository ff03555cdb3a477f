//! Client fingerprinting
//!
//! Crawler, mobile and signed-in detection. The classifier treats this as
//! an oracle; [`UserAgentFingerprint`] is the stock implementation.

use axum::http::header;
use regex::Regex;

use super::env::RequestEnv;

pub trait ClientFingerprint: Send + Sync {
    fn is_crawler(&self, env: &RequestEnv) -> bool;
    fn is_mobile(&self, env: &RequestEnv) -> bool;
    fn has_auth_cookie(&self, env: &RequestEnv) -> bool;
}

/// Engines real browsers advertise
const BROWSER_USER_AGENTS: &str = "trident|webkit|gecko|chrome|safari|msie|opera|goanna";
/// Known automated agents, checked even when the agent looks like a browser
const CRAWLER_USER_AGENTS: &str =
    "rss|bot|spider|crawler|facebook|archive|wayback|ping|monitor|lighthouse|headless";

pub struct UserAgentFingerprint {
    browser: Regex,
    crawler: Regex,
    auth_cookie: String,
}

impl UserAgentFingerprint {
    /// Built-in browser and crawler patterns
    pub fn new(auth_cookie: impl Into<String>) -> Result<Self, regex::Error> {
        Self::with_patterns(BROWSER_USER_AGENTS, CRAWLER_USER_AGENTS, auth_cookie)
    }

    /// Custom `|`-separated user agent fragments, matched case-insensitively
    pub fn with_patterns(
        browser: &str,
        crawler: &str,
        auth_cookie: impl Into<String>,
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            browser: Regex::new(&format!("(?i){browser}"))?,
            crawler: Regex::new(&format!("(?i){crawler}"))?,
            auth_cookie: auth_cookie.into(),
        })
    }
}

impl ClientFingerprint for UserAgentFingerprint {
    /// No user agent, an agent that doesn't look like a browser, or a browser-like
    /// agent naming a known bot
    fn is_crawler(&self, env: &RequestEnv) -> bool {
        if env
            .header(header::VIA)
            .map(|via| via.contains("web.archive.org"))
            .unwrap_or(false)
        {
            return true;
        }
        match env.user_agent() {
            None => true,
            Some(ua) if ua.trim().is_empty() => true,
            Some(ua) => !self.browser.is_match(ua) || self.crawler.is_match(ua),
        }
    }

    fn is_mobile(&self, env: &RequestEnv) -> bool {
        env.user_agent()
            .map(|ua| (ua.contains("Mobile") && !ua.contains("iPad")) || ua.contains("Android"))
            .unwrap_or(false)
    }

    fn has_auth_cookie(&self, env: &RequestEnv) -> bool {
        env.headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|cookies| cookies.split(';'))
            .filter_map(|pair| pair.split_once('='))
            .any(|(name, value)| name.trim() == self.auth_cookie && !value.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admission::ClientIdentity;
    use axum::body::Body;
    use axum::http::Request;

    const FIREFOX: &str =
        "Mozilla/5.0 (X11; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0";
    const IPHONE: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Mobile/15E148 Safari/604.1";
    const IPAD: &str = "Mozilla/5.0 (iPad; CPU OS 17_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Mobile/15E148 Safari/604.1";
    const GOOGLEBOT: &str =
        "Mozilla/5.0 (compatible; Googlebot/2.1; +http://www.google.com/bot.html)";

    fn env(headers: &[(&str, &str)]) -> RequestEnv {
        let mut builder = Request::builder().uri("/");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let request = builder.body(Body::empty()).unwrap();
        RequestEnv::capture(&request, &ClientIdentity::new("203.0.113.5"))
    }

    #[test]
    fn test_crawler_detection() {
        let fp = UserAgentFingerprint::new("_t").unwrap();
        assert!(fp.is_crawler(&env(&[("user-agent", GOOGLEBOT)])));
        assert!(fp.is_crawler(&env(&[("user-agent", "curl/8.5.0")])));
        assert!(fp.is_crawler(&env(&[])));
        assert!(fp.is_crawler(&env(&[("user-agent", FIREFOX), ("via", "1.1 web.archive.org")])));
        assert!(!fp.is_crawler(&env(&[("user-agent", FIREFOX)])));
        assert!(!fp.is_crawler(&env(&[("user-agent", IPHONE)])));
    }

    #[test]
    fn test_mobile_detection() {
        let fp = UserAgentFingerprint::new("_t").unwrap();
        assert!(fp.is_mobile(&env(&[("user-agent", IPHONE)])));
        assert!(!fp.is_mobile(&env(&[("user-agent", IPAD)])));
        assert!(fp.is_mobile(&env(&[(
            "user-agent",
            "Mozilla/5.0 (Linux; Android 14) AppleWebKit/537.36 Chrome/126.0 Safari/537.36"
        )])));
        assert!(!fp.is_mobile(&env(&[("user-agent", FIREFOX)])));
        assert!(!fp.is_mobile(&env(&[])));
    }

    #[test]
    fn test_auth_cookie() {
        let fp = UserAgentFingerprint::new("_t").unwrap();
        assert!(fp.has_auth_cookie(&env(&[("cookie", "theme=dark; _t=abc123")])));
        assert!(!fp.has_auth_cookie(&env(&[("cookie", "_t=; theme=dark")])));
        assert!(!fp.has_auth_cookie(&env(&[("cookie", "_token=abc")])));
        assert!(!fp.has_auth_cookie(&env(&[])));
    }

    #[test]
    fn test_custom_patterns() {
        let fp = UserAgentFingerprint::with_patterns("mozilla", "uptime", "session").unwrap();
        assert!(fp.is_crawler(&env(&[("user-agent", "Mozilla/5.0 UptimeRobot/2.0")])));
        assert!(fp.has_auth_cookie(&env(&[("cookie", "session=1")])));
        assert!(UserAgentFingerprint::with_patterns("(", "bot", "_t").is_err());
    }

    #[test]
    fn test_builtin_patterns_compile() {
        assert!(UserAgentFingerprint::new("_t").is_ok());
        assert!(UserAgentFingerprint::with_patterns(BROWSER_USER_AGENTS, "(", "_t").is_err());
    }
}
