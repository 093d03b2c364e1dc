//! HTTP fixtures served by wiremock

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Minimal PDF-looking body of `len` bytes
pub fn pdf_body(len: usize) -> Vec<u8> {
    let mut body = b"%PDF-1.4\n".to_vec();
    body.extend((0..len.saturating_sub(body.len())).map(|i| b'a' + (i % 26) as u8));
    body.truncate(len);
    body
}

/// Serve `body` with 200 at `route`
pub async fn serve_file(server: &MockServer, route: &str, body: Vec<u8>) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
        .mount(server)
        .await;
}

/// Serve `status` at `route`, expecting exactly `times` requests
pub async fn serve_status(server: &MockServer, route: &str, status: u16, times: u64) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(status))
        .expect(times)
        .mount(server)
        .await;
}

/// Serve one 503 at `route`, then `body`
pub async fn serve_flaky(server: &MockServer, route: &str, body: Vec<u8>) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .expect(1)
        .mount(server)
        .await;
    serve_file(server, route, body).await;
}
