use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use bytes::Bytes;
use http::{header, HeaderMap, Request, Response, StatusCode, Uri};
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use switch_engine::is_local_client;
use switch_redirect::{Decision, RedirectError, Switch, SwitchAction, SwitchRequest};

/// Response header carrying the evaluated verdict.
pub const VERDICT_HEADER: &str = "x-secure-switch-verdict";

/// How inbound requests are mapped onto the protected application.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub application_root: String,
    pub trust_forwarded_headers: bool,
}

/// Forward-auth endpoint.
///
/// A front proxy sends each client request here before serving it. A `200`
/// means "serve as is"; a `302` carries the `Location` the client must be
/// sent to instead.
pub struct Server {
    switch: Arc<Switch>,
    settings: Arc<ServerSettings>,
}

impl Server {
    pub fn new(switch: Switch, settings: ServerSettings) -> Self {
        Self {
            switch: Arc::new(switch),
            settings: Arc::new(settings),
        }
    }

    /// Accept connections on `listener` until `shutdown` fires. Each
    /// connection is served in its own Tokio task.
    pub async fn run(
        &self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> anyhow::Result<()> {
        info!(addr = %listener.local_addr()?, "forward-auth endpoint listening");

        loop {
            let (stream, remote_addr) = tokio::select! {
                accepted = listener.accept() => accepted?,
                _ = shutdown.recv() => {
                    info!("forward-auth endpoint shutting down");
                    return Ok(());
                }
            };
            let server_addr = stream.local_addr()?;
            let switch = Arc::clone(&self.switch);
            let settings = Arc::clone(&self.settings);

            tokio::spawn(async move {
                let service = service_fn(move |req: Request<Incoming>| {
                    let response = handle(
                        &switch,
                        &settings,
                        req.headers(),
                        req.uri(),
                        remote_addr,
                        server_addr,
                    );
                    async move { Ok::<_, Infallible>(response) }
                });

                if let Err(err) = http1::Builder::new()
                    .serve_connection(TokioIo::new(stream), service)
                    .await
                {
                    error!(%remote_addr, %err, "connection error");
                }
            });
        }
    }
}

/// Decide a single request and render the response.
fn handle(
    switch: &Switch,
    settings: &ServerSettings,
    headers: &HeaderMap,
    uri: &Uri,
    remote_addr: SocketAddr,
    server_addr: SocketAddr,
) -> Response<Full<Bytes>> {
    let decision = switch_request(settings, headers, uri, remote_addr, server_addr)
        .and_then(|request| switch.decide(&request));

    match decision {
        Ok(decision) => {
            debug!(
                %remote_addr,
                verdict = %decision.evaluation.verdict,
                reason = %decision.evaluation.reason,
                "request decided"
            );
            respond(&decision)
        }
        Err(err) => {
            warn!(%remote_addr, %err, "rejecting request");
            plain(StatusCode::BAD_REQUEST, err.to_string())
        }
    }
}

/// Rebuild the client's request from the forwarded headers (when trusted)
/// or from the request line and `Host` header.
fn switch_request(
    settings: &ServerSettings,
    headers: &HeaderMap,
    uri: &Uri,
    remote_addr: SocketAddr,
    server_addr: SocketAddr,
) -> Result<SwitchRequest, RedirectError> {
    let forwarded = |name: &str| {
        if settings.trust_forwarded_headers {
            header_value(headers, name)
        } else {
            None
        }
    };

    let scheme = forwarded("x-forwarded-proto").map(first_value).unwrap_or("http");
    let host = forwarded("x-forwarded-host")
        .map(first_value)
        .or_else(|| header_value(headers, header::HOST.as_str()))
        .or_else(|| uri.authority().map(|a| a.as_str()))
        .unwrap_or_default();
    let target = forwarded("x-forwarded-uri")
        .map(first_value)
        .or_else(|| uri.path_and_query().map(|pq| pq.as_str()))
        .unwrap_or("/");
    let client_ip = forwarded("x-forwarded-for")
        .map(last_value)
        .and_then(|ip| ip.parse::<IpAddr>().ok())
        .unwrap_or(remote_addr.ip());

    let request = SwitchRequest::from_parts(scheme, host, target)?
        .with_application_root(settings.application_root.as_str())
        .local(is_local_client(client_ip, server_addr.ip()));
    Ok(request)
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// First entry of a list-valued header.
fn first_value(value: &str) -> &str {
    value.split(',').next().unwrap_or(value).trim()
}

/// Last entry of a list-valued header. Each proxy appends the address it
/// received the request from, so only the last `X-Forwarded-For` entry was
/// written by the proxy in front of us; earlier entries come from the client.
fn last_value(value: &str) -> &str {
    value.rsplit(',').next().unwrap_or(value).trim()
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

fn respond(decision: &Decision) -> Response<Full<Bytes>> {
    let builder = Response::builder().header(VERDICT_HEADER, decision.evaluation.verdict.to_string());

    let built = match &decision.action {
        SwitchAction::None => builder
            .status(StatusCode::OK)
            .body(Full::new(Bytes::new())),
        SwitchAction::Redirect(redirect) => {
            let location = redirect.location.as_str();
            let builder = builder
                .status(StatusCode::FOUND)
                .header(header::LOCATION, location);
            if redirect.bypass_warning {
                builder
                    .header("refresh", format!("0;URL={location}"))
                    .header(header::CONTENT_TYPE, "text/html; charset=utf-8")
                    .body(Full::new(Bytes::from(bypass_page(location))))
            } else {
                builder.body(Full::new(Bytes::new()))
            }
        }
    };

    built.unwrap_or_else(|err| {
        error!(%err, "failed to build response");
        plain(StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
    })
}

/// Page that moves the browser with a meta refresh, which does not raise the
/// secure-to-insecure warning a plain redirect does.
fn bypass_page(location: &str) -> String {
    let escaped = escape_attribute(location);
    format!(
        "<html><head><meta http-equiv=\"refresh\" content=\"0;URL={escaped}\"></head>\
         <body><a href=\"{escaped}\">Continue</a></body></html>"
    )
}

fn escape_attribute(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            c => out.push(c),
        }
    }
    out
}

fn plain(status: StatusCode, body: String) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;
    use http_body_util::BodyExt;
    use switch_engine::loader::load_rules_from_str;
    use switch_engine::SharedRuleSet;
    use switch_redirect::ExemptHosts;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    const RULES: &str = r#"
warning_bypass_mode: always_bypass
rules:
  - type: directory
    path: /
    secure: insecure
    recurse: true
  - type: directory
    path: account
    recurse: true
"#;

    fn switch() -> Switch {
        let rules = load_rules_from_str(RULES).unwrap();
        Switch::new(Arc::new(SharedRuleSet::new(rules)))
            .with_hook(ExemptHosts::new(["*.internal"]).unwrap())
    }

    fn settings(trust: bool) -> ServerSettings {
        ServerSettings {
            application_root: "/".to_string(),
            trust_forwarded_headers: trust,
        }
    }

    fn addr(s: &str) -> SocketAddr {
        s.parse().unwrap()
    }

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_str(value).unwrap());
        }
        map
    }

    fn call(trust: bool, pairs: &[(&'static str, &str)], uri: &str) -> Response<Full<Bytes>> {
        handle(
            &switch(),
            &settings(trust),
            &headers(pairs),
            &uri.parse().unwrap(),
            addr("203.0.113.7:51000"),
            addr("10.0.0.2:9180"),
        )
    }

    fn header<'a>(response: &'a Response<Full<Bytes>>, name: &str) -> Option<&'a str> {
        response.headers().get(name).and_then(|v| v.to_str().ok())
    }

    // ---- request reconstruction ----

    #[test]
    fn forwarded_headers_rebuild_the_client_request() {
        let h = headers(&[
            ("x-forwarded-proto", "https, http"),
            ("x-forwarded-host", "shop.example.com"),
            ("x-forwarded-uri", "/shop/cart.aspx?id=1"),
            ("x-forwarded-for", "198.51.100.4, 10.0.0.2"),
            ("host", "auth.local:9180"),
        ]);
        let s = ServerSettings {
            application_root: "/shop".to_string(),
            trust_forwarded_headers: true,
        };
        let req = switch_request(&s, &h, &"/auth".parse().unwrap(), addr("172.16.0.1:4000"), addr("10.0.0.2:9180"))
            .unwrap();

        assert_eq!(req.url.as_str(), "https://shop.example.com/shop/cart.aspx?id=1");
        assert_eq!(req.application_root, "/shop");
        assert!(req.is_local);
    }

    #[test]
    fn untrusted_forwarded_headers_are_ignored() {
        let h = headers(&[
            ("x-forwarded-proto", "https"),
            ("x-forwarded-host", "evil.example.com"),
            ("host", "www.example.com"),
        ]);
        let req = switch_request(
            &settings(false),
            &h,
            &"/index.aspx?a=b".parse().unwrap(),
            addr("203.0.113.7:51000"),
            addr("10.0.0.2:9180"),
        )
        .unwrap();

        assert_eq!(req.url.as_str(), "http://www.example.com/index.aspx?a=b");
        assert!(!req.is_local);
    }

    #[test]
    fn client_written_forwarded_for_entries_are_not_trusted() {
        let s = settings(true);
        let uri: Uri = "/".parse().unwrap();
        let peer = addr("10.0.0.9:4000");
        let server = addr("10.0.0.2:9180");

        let h = headers(&[
            ("host", "www.example.com"),
            ("x-forwarded-for", "127.0.0.1, 203.0.113.7"),
        ]);
        assert!(!switch_request(&s, &h, &uri, peer, server).unwrap().is_local);

        let h = headers(&[
            ("host", "www.example.com"),
            ("x-forwarded-for", "10.0.0.2, 203.0.113.7"),
        ]);
        assert!(!switch_request(&s, &h, &uri, peer, server).unwrap().is_local);

        let h = headers(&[("host", "www.example.com"), ("x-forwarded-for", "127.0.0.1")]);
        assert!(switch_request(&s, &h, &uri, peer, server).unwrap().is_local);
    }

    #[test]
    fn loopback_clients_are_local() {
        let h = headers(&[("host", "www.example.com")]);
        let uri: Uri = "/".parse().unwrap();
        let server = addr("10.0.0.2:9180");

        let req = switch_request(&settings(false), &h, &uri, addr("127.0.0.1:5000"), server).unwrap();
        assert!(req.is_local);
        let req = switch_request(&settings(false), &h, &uri, addr("10.0.0.2:5000"), server).unwrap();
        assert!(req.is_local);
        let req = switch_request(&settings(false), &h, &uri, addr("10.0.0.3:5000"), server).unwrap();
        assert!(!req.is_local);
    }

    #[test]
    fn list_entries_are_split_and_trimmed() {
        assert_eq!(first_value("https , http"), "https");
        assert_eq!(last_value("198.51.100.4,  10.0.0.2 "), "10.0.0.2");
        assert_eq!(last_value("10.0.0.2"), "10.0.0.2");
    }

    // ---- responses ----

    #[test]
    fn secure_path_gets_a_redirect() {
        let resp = call(
            true,
            &[("x-forwarded-proto", "http"), ("x-forwarded-host", "www.example.com")],
            "/account/login.aspx",
        );
        assert_eq!(resp.status(), StatusCode::FOUND);
        assert_eq!(header(&resp, "location"), Some("https://www.example.com/account/login.aspx"));
        assert_eq!(header(&resp, VERDICT_HEADER), Some("secure"));
        assert!(header(&resp, "refresh").is_none());
    }

    #[tokio::test]
    async fn insecure_redirect_bypasses_the_warning() {
        let resp = call(
            true,
            &[("x-forwarded-proto", "https"), ("x-forwarded-host", "www.example.com")],
            "/news/?a=1&b=2",
        );
        assert_eq!(resp.status(), StatusCode::FOUND);
        assert_eq!(header(&resp, "location"), Some("http://www.example.com/news/?a=1&b=2"));
        assert_eq!(header(&resp, "refresh"), Some("0;URL=http://www.example.com/news/?a=1&b=2"));

        let body = resp.into_body().collect().await.unwrap().to_bytes();
        let body = String::from_utf8(body.to_vec()).unwrap();
        assert!(body.contains("content=\"0;URL=http://www.example.com/news/?a=1&amp;b=2\""));
    }

    #[test]
    fn matching_transport_passes() {
        let resp = call(
            true,
            &[("x-forwarded-proto", "https"), ("x-forwarded-host", "www.example.com")],
            "/account/",
        );
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(header(&resp, VERDICT_HEADER), Some("secure"));
    }

    #[test]
    fn exempt_host_passes() {
        let resp = call(true, &[("x-forwarded-host", "build.internal")], "/account/");
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(header(&resp, VERDICT_HEADER), Some("ignore"));
    }

    #[test]
    fn missing_host_is_a_bad_request() {
        let resp = call(false, &[], "/account/");
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn attribute_escaping() {
        assert_eq!(escape_attribute("a&b\"<c>"), "a&amp;b&quot;&lt;c&gt;");
    }

    // ---- end to end ----

    #[tokio::test]
    async fn serves_forward_auth_over_tcp() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let server = Server::new(switch(), settings(true));
        let task = tokio::spawn(async move { server.run(listener, shutdown_rx).await });

        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(
                b"GET /auth HTTP/1.1\r\n\
                  Host: auth.local\r\n\
                  X-Forwarded-Proto: http\r\n\
                  X-Forwarded-Host: www.example.com\r\n\
                  X-Forwarded-Uri: /account/profile.aspx\r\n\
                  Connection: close\r\n\r\n",
            )
            .await
            .unwrap();
        let mut raw = Vec::new();
        stream.read_to_end(&mut raw).await.unwrap();
        let raw = String::from_utf8_lossy(&raw);

        assert!(raw.starts_with("HTTP/1.1 302"), "unexpected response: {raw}");
        assert!(raw
            .to_ascii_lowercase()
            .contains("location: https://www.example.com/account/profile.aspx"));

        shutdown_tx.send(()).unwrap();
        task.await.unwrap().unwrap();
    }
}
