use axum::{
    extract::Request,
    middleware::Next,
    response::Response,
};
use std::time::Instant;

/// Middleware that logs HTTP requests at INFO level.
///
/// Only the path is logged; query strings carry usernames.
pub async fn request_logger(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let response = next.run(request).await;

    tracing::info!(
        method = %method,
        path = %path,
        status = %response.status().as_u16(),
        duration_ms = %start.elapsed().as_millis(),
        "HTTP request"
    );

    response
}

/// Keep the first two characters of the local part: `alice@corp.com` -> `al***@corp.com`.
pub fn mask_username(username: &str) -> String {
    fn mask(part: &str) -> String {
        let count = part.chars().count();
        if count > 2 {
            part.chars().take(2).chain(std::iter::repeat('*').take(count - 2)).collect()
        } else {
            part.chars().take(1).chain(std::iter::once('*')).collect()
        }
    }

    match username.split_once('@') {
        Some((local, domain)) => format!("{}@{}", mask(local), domain),
        None => mask(username),
    }
}

/// Keep the first two octets of an IPv4 address.
pub fn mask_ip(ip: &str) -> String {
    let parts: Vec<&str> = ip.split('.').collect();
    if parts.len() == 4 {
        format!("{}.{}.xxx.xxx", parts[0], parts[1])
    } else {
        "xxx.xxx.xxx.xxx".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_username() {
        assert_eq!(mask_username("alice"), "al***");
        assert_eq!(mask_username("alice@corp.com"), "al***@corp.com");
        assert_eq!(mask_username("jo"), "j*");
        assert_eq!(mask_username("x@corp.com"), "x*@corp.com");
    }

    #[test]
    fn test_mask_ip() {
        assert_eq!(mask_ip("203.0.113.42"), "203.0.xxx.xxx");
        assert_eq!(mask_ip("::1"), "xxx.xxx.xxx.xxx");
    }
}
