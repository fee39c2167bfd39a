pub const AUTH_TOKEN_COOKIE: &str = "auth_token";
pub const CSRF_COOKIE: &str = "ct0";

/// The cookie-derived credential material owned by the session manager.
/// Order is preserved so re-serialized headers look like what a browser
/// would send
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CredentialSet {
    cookies: Vec<(String, String)>,
}

impl CredentialSet {
    /// Parse a semicolon-delimited cookie header. Values containing `=`
    /// survive intact and whitespace around delimiters is optional
    pub fn from_cookie_header(raw: &str) -> Self {
        let cookies = raw
            .split(';')
            .filter_map(|pair| {
                let mut parts = pair.trim().splitn(2, '=');
                let name = parts.next()?.trim();
                if name.is_empty() {
                    return None;
                }
                let value = parts.next().unwrap_or("").trim();
                Some((name.to_owned(), value.to_owned()))
            })
            .collect();
        Self { cookies }
    }

    pub fn to_cookie_header(&self) -> String {
        self.cookies
            .iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect::<Vec<_>>()
            .join("; ")
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.cookies
            .iter()
            .find(|(cookie, _)| cookie == name)
            .map(|(_, value)| value.as_str())
    }

    /// Insert or replace a cookie, keeping its original position on
    /// replacement
    pub fn set(&mut self, name: &str, value: &str) {
        match self.cookies.iter_mut().find(|(cookie, _)| cookie == name) {
            Some((_, existing)) => *existing = value.to_owned(),
            None => self.cookies.push((name.to_owned(), value.to_owned())),
        }
    }

    pub fn auth_token(&self) -> Option<&str> {
        self.get(AUTH_TOKEN_COOKIE).filter(|value| !value.is_empty())
    }

    pub fn csrf_token(&self) -> Option<&str> {
        self.get(CSRF_COOKIE).filter(|value| !value.is_empty())
    }

    /// Authenticated iff both the session cookie and the CSRF cookie are
    /// present and non-empty
    pub fn is_authenticated(&self) -> bool {
        self.auth_token().is_some() && self.csrf_token().is_some()
    }

    /// Which required credential cookie is absent, if any
    pub fn missing_field(&self) -> Option<&'static str> {
        if self.auth_token().is_none() {
            Some(AUTH_TOKEN_COOKIE)
        } else if self.csrf_token().is_none() {
            Some(CSRF_COOKIE)
        } else {
            None
        }
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.cookies
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_with_and_without_whitespace() {
        for raw in [
            "auth_token=abc123; ct0=def456; lang=en",
            "auth_token=abc123;ct0=def456;lang=en",
            "  auth_token = abc123 ;ct0=def456;  lang=en",
        ]
        .iter()
        {
            let set = CredentialSet::from_cookie_header(raw);
            assert_eq!(set.auth_token(), Some("abc123"), "input: {}", raw);
            assert_eq!(set.csrf_token(), Some("def456"), "input: {}", raw);
            assert!(set.is_authenticated());
            let header = set.to_cookie_header();
            assert!(header.contains("auth_token=abc123"));
            assert!(header.contains("ct0=def456"));
        }
    }

    #[test]
    fn equals_inside_values_survive() {
        let set = CredentialSet::from_cookie_header("guest_id=v1%3A1234==; ct0=x");
        assert_eq!(set.get("guest_id"), Some("v1%3A1234=="));
    }

    #[test]
    fn round_trip_preserves_pairs() {
        let set = CredentialSet::from_cookie_header("a=1; auth_token=t;ct0=c");
        let reparsed = CredentialSet::from_cookie_header(&set.to_cookie_header());
        assert_eq!(set, reparsed);
    }

    #[test]
    fn authentication_needs_both_cookies_non_empty() {
        assert!(!CredentialSet::from_cookie_header("auth_token=abc").is_authenticated());
        assert!(!CredentialSet::from_cookie_header("auth_token=abc; ct0=").is_authenticated());
        assert_eq!(
            CredentialSet::from_cookie_header("ct0=x").missing_field(),
            Some(AUTH_TOKEN_COOKIE)
        );
        assert_eq!(
            CredentialSet::from_cookie_header("auth_token=x").missing_field(),
            Some(CSRF_COOKIE)
        );
    }

    #[test]
    fn set_replaces_in_place() {
        let mut set = CredentialSet::from_cookie_header("a=1; b=2");
        set.set("a", "updated");
        set.set("c", "3");
        assert_eq!(set.to_cookie_header(), "a=updated; b=2; c=3");
    }
}
