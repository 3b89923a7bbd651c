//! Per-request strategy selection.

use crate::config::RouterConfig;
use crate::http::Request;

/// Which strategy a request is served with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestClass {
    /// Not a cacheable read (non-`GET`, or a non-http(s) scheme such as
    /// `chrome-extension:`, `data:` or `blob:`). Forwarded untouched.
    Passthrough,
    /// Cache-first into the static generation.
    StaticAsset,
    /// Remote backend call: network-first with write-back to the dynamic generation.
    ApiCall,
    /// Network-first with cache fallback, no write-back.
    Other,
}

/// Classifies `request`. Static rules are checked before backend hosts, so
/// `fonts.googleapis.com` is a static asset even though it contains
/// `googleapis.com`.
pub fn classify(request: &Request, config: &RouterConfig) -> RequestClass {
    if !request.method().is_cacheable() {
        return RequestClass::Passthrough;
    }

    let url = request.url();
    if !matches!(url.scheme(), "http" | "https") {
        return RequestClass::Passthrough;
    }

    let host = url.host_str().unwrap_or_default();
    let path = url.path();

    let static_host = config.static_hosts.iter().any(|h| h.eq_ignore_ascii_case(host));
    let static_path = config
        .static_extensions
        .iter()
        .any(|ext| path.ends_with(ext.as_str()));

    if static_host || static_path {
        RequestClass::StaticAsset
    } else if config.api_hosts.iter().any(|h| host.contains(h.as_str())) {
        RequestClass::ApiCall
    } else {
        RequestClass::Other
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::Method;
    use url::Url;

    fn class_of(method: Method, url: &str) -> RequestClass {
        let request = Request::new(method, Url::parse(url).unwrap());
        classify(&request, &RouterConfig::default())
    }

    #[test]
    fn static_by_extension_and_host() {
        assert_eq!(class_of(Method::Get, "http://localhost:5173/app.js"), RequestClass::StaticAsset);
        assert_eq!(class_of(Method::Get, "http://localhost:5173/img/car.jpeg"), RequestClass::StaticAsset);
        assert_eq!(
            class_of(Method::Get, "https://fonts.googleapis.com/css2?family=Roboto"),
            RequestClass::StaticAsset
        );
    }

    #[test]
    fn backend_hosts_are_api_calls() {
        assert_eq!(
            class_of(Method::Get, "https://firestore.googleapis.com/v1/projects/p/documents/vehicles"),
            RequestClass::ApiCall
        );
        assert_eq!(
            class_of(Method::Get, "https://automarket.firebaseapp.com/__/auth/handler"),
            RequestClass::ApiCall
        );
    }

    #[test]
    fn everything_else_is_other() {
        assert_eq!(class_of(Method::Get, "http://localhost:5173/"), RequestClass::Other);
        assert_eq!(class_of(Method::Get, "https://example.com/listings?page=2"), RequestClass::Other);
    }

    #[test]
    fn non_get_and_foreign_schemes_pass_through() {
        assert_eq!(class_of(Method::Post, "http://localhost:5173/app.js"), RequestClass::Passthrough);
        assert_eq!(class_of(Method::Head, "http://localhost:5173/app.js"), RequestClass::Passthrough);
        assert_eq!(
            class_of(Method::Get, "chrome-extension://abcdef/content.js"),
            RequestClass::Passthrough
        );
        assert_eq!(class_of(Method::Get, "data:text/plain,hi"), RequestClass::Passthrough);
        assert_eq!(
            class_of(Method::Get, "blob:http://localhost:5173/0b1c-44"),
            RequestClass::Passthrough
        );
    }
}
