use color_eyre::{eyre::eyre, Result};
use std::collections::BTreeMap;
use url::Url;

/// An intercepted request.
///
/// Header names are stored lowercased; the method is stored uppercased.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
  method: String,
  url: Url,
  headers: BTreeMap<String, String>,
}

impl Request {
  pub fn new(method: &str, url: Url) -> Self {
    Self {
      method: method.to_ascii_uppercase(),
      url,
      headers: BTreeMap::new(),
    }
  }

  pub fn get(url: Url) -> Self {
    Self::new("GET", url)
  }

  /// Build a request from a possibly relative URL, resolved against `base`.
  pub fn parse(method: &str, raw: &str, base: &Url) -> Result<Self> {
    let url = base
      .join(raw)
      .map_err(|e| eyre!("Invalid request URL '{}': {}", raw, e))?;
    Ok(Self::new(method, url))
  }

  pub fn with_header(mut self, name: &str, value: &str) -> Self {
    self
      .headers
      .insert(name.to_ascii_lowercase(), value.to_string());
    self
  }

  pub fn method(&self) -> &str {
    &self.method
  }

  pub fn is_get(&self) -> bool {
    self.method == "GET"
  }

  pub fn url(&self) -> &Url {
    &self.url
  }

  pub fn header(&self, name: &str) -> Option<&str> {
    self
      .headers
      .get(&name.to_ascii_lowercase())
      .map(String::as_str)
  }

  pub fn headers(&self) -> impl Iterator<Item = (&str, &str)> {
    self.headers.iter().map(|(k, v)| (k.as_str(), v.as_str()))
  }

  /// Whether the `Accept` header asks for an HTML document.
  pub fn accepts_html(&self) -> bool {
    self
      .header("accept")
      .is_some_and(|accept| accept.contains("text/html"))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_parse_resolves_relative() {
    let base = Url::parse("https://example.com").unwrap();
    let req = Request::parse("get", "/styles.css", &base).unwrap();

    assert_eq!(req.method(), "GET");
    assert!(req.is_get());
    assert_eq!(req.url().as_str(), "https://example.com/styles.css");
  }

  #[test]
  fn test_parse_keeps_absolute() {
    let base = Url::parse("https://example.com").unwrap();
    let req = Request::parse("GET", "https://cdn.example.net/lib.js", &base).unwrap();

    assert_eq!(req.url().host_str(), Some("cdn.example.net"));
  }

  #[test]
  fn test_header_lookup_is_case_insensitive() {
    let req = Request::get(Url::parse("https://example.com/").unwrap())
      .with_header("Accept", "text/html,application/xhtml+xml");

    assert_eq!(req.header("accept"), Some("text/html,application/xhtml+xml"));
    assert!(req.accepts_html());
  }

  #[test]
  fn test_accepts_html_requires_header() {
    let req = Request::get(Url::parse("https://example.com/").unwrap());
    assert!(!req.accepts_html());

    let req = req.with_header("accept", "image/webp,*/*");
    assert!(!req.accepts_html());
  }
}
