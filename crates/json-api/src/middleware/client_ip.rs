//! Client IP extraction.
//!
//! Proxy headers take precedence over the socket peer: only the first
//! `X-Forwarded-For` entry is trusted (leftmost is the original client),
//! then `X-Real-IP`, then the remote address with any port stripped.

use std::net::SocketAddr;

use salvo::Request;

pub(crate) fn client_ip(req: &Request) -> String {
    if let Some(forwarded) = req.header::<String>("x-forwarded-for") {
        let first = forwarded.split(',').next().unwrap_or_default().trim();

        if !first.is_empty() {
            return first.to_owned();
        }
    }

    if let Some(real_ip) = req.header::<String>("x-real-ip") {
        let real_ip = real_ip.trim();

        if !real_ip.is_empty() {
            return real_ip.to_owned();
        }
    }

    let remote = req.remote_addr().to_string();

    remote
        .parse::<SocketAddr>()
        .map_or(remote, |addr| addr.ip().to_string())
}

#[cfg(test)]
mod tests {
    use salvo::test::TestClient;

    use super::*;

    fn request_with_headers(headers: &[(&'static str, &'static str)]) -> Request {
        let mut builder = TestClient::get("http://example.com/v1/scan");

        for (name, value) in headers {
            builder = builder.add_header(*name, *value, true);
        }

        builder.build()
    }

    #[test]
    fn prefers_first_forwarded_for_entry() {
        let req = request_with_headers(&[
            ("x-forwarded-for", "203.0.113.7, 10.0.0.1, 10.0.0.2"),
            ("x-real-ip", "198.51.100.1"),
        ]);

        assert_eq!(client_ip(&req), "203.0.113.7");
    }

    #[test]
    fn falls_back_to_real_ip_header() {
        let req = request_with_headers(&[("x-real-ip", " 198.51.100.1 ")]);

        assert_eq!(client_ip(&req), "198.51.100.1");
    }

    #[test]
    fn empty_forwarded_entry_is_skipped() {
        let req = request_with_headers(&[
            ("x-forwarded-for", " , 10.0.0.1"),
            ("x-real-ip", "198.51.100.1"),
        ]);

        assert_eq!(client_ip(&req), "198.51.100.1");
    }
}
