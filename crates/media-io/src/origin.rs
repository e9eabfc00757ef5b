use url::Url;

/// The origin of the embedding page, used to normalize media URLs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageOrigin {
    base: Url,
}

impl PageOrigin {
    pub fn parse(page_url: &str) -> Result<Self, url::ParseError> {
        Ok(Self { base: Url::parse(page_url)? })
    }

    pub fn is_secure(&self) -> bool { self.base.scheme() == "https" }

    /// Upgrades `http:` to `https:` when the page itself is served securely.
    pub fn fix_protocol(&self, raw: &str) -> String {
        if !self.is_secure() { return raw.to_string(); }
        match self.base.join(raw) {
            Ok(mut u) if u.scheme() == "http" => {
                if u.set_scheme("https").is_ok() { u.to_string() } else { raw.to_string() }
            }
            _ => raw.to_string(),
        }
    }

    /// Same-origin URLs become path-relative; everything else is returned unchanged.
    pub fn to_relative_if_same_origin(&self, raw: &str) -> String {
        match self.base.join(raw) {
            Ok(u) if u.origin() == self.base.origin() => {
                let mut out = u.path().to_string();
                if let Some(q) = u.query() { out.push('?'); out.push_str(q); }
                if let Some(f) = u.fragment() { out.push('#'); out.push_str(f); }
                out
            }
            _ => raw.to_string(),
        }
    }

    pub fn normalize(&self, raw: &str) -> String {
        self.to_relative_if_same_origin(&self.fix_protocol(raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upgrades_and_relativizes_on_secure_page() {
        let page = PageOrigin::parse("https://tt.example/feed").unwrap();
        assert_eq!(page.normalize("http://tt.example/v/1.m3u8?x=1"), "/v/1.m3u8?x=1");
        assert_eq!(page.normalize("http://cdn.example/v/1.mp4"), "https://cdn.example/v/1.mp4");
        assert_eq!(page.normalize("/v/2.mp4"), "/v/2.mp4");
    }

    #[test]
    fn insecure_page_keeps_scheme() {
        let page = PageOrigin::parse("http://tt.example/").unwrap();
        assert_eq!(page.fix_protocol("http://cdn.example/a.mp4"), "http://cdn.example/a.mp4");
        assert_eq!(page.normalize("https://tt.example/a.mp4"), "https://tt.example/a.mp4");
    }
}
