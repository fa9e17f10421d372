use url::Url;

pub fn normalize_url(input: &str) -> String {
    let trimmed = input.trim().trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("http://{}", trimmed)
    }
}

/// Push endpoint served next to the REST API: `http://h/api` becomes `ws://h/api/ws`.
pub fn push_url_for(base_url: &str) -> Result<Url, url::ParseError> {
    let mut url = Url::parse(&normalize_url(base_url))?;
    let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
    // http(s) -> ws(s) is always an allowed scheme change
    let _ = url.set_scheme(scheme);
    let path = url.path().trim_end_matches('/').to_string();
    let api = if path.ends_with("/api") { path } else { format!("{}/api", path) };
    url.set_path(&format!("{}/ws", api));
    url.set_query(None);
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_scheme_and_trailing_slash() {
        assert_eq!(normalize_url(" localhost:8080/api/ "), "http://localhost:8080/api");
        assert_eq!(normalize_url("https://chat.example.com"), "https://chat.example.com");
    }

    #[test]
    fn derives_push_url() {
        assert_eq!(push_url_for("http://localhost:8080/api").unwrap().as_str(), "ws://localhost:8080/api/ws");
        assert_eq!(push_url_for("https://chat.example.com").unwrap().as_str(), "wss://chat.example.com/api/ws");
    }
}
