use serde_json::{json, Value};

/// Result of a gateway call. Failures are values for the caller to inspect, not errors.
#[must_use]
#[derive(Debug, Clone, PartialEq)]
pub enum RequestOutcome {
    Data(Value),
    Failure(Value),
}

impl RequestOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failure(_))
    }

    pub fn data(&self) -> Option<&Value> {
        match self {
            Self::Data(value) => Some(value),
            Self::Failure(_) => None,
        }
    }

    pub fn into_value(self) -> Value {
        match self {
            Self::Data(value) | Self::Failure(value) => value,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpGateway {
    base_url: String,
    client: reqwest::Client,
}

impl HttpGateway {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: reqwest::Client::new(),
        }
    }

    pub fn generate_path(&self, path: &str, query: Option<&str>) -> String {
        match query.filter(|query| !query.is_empty()) {
            Some(query) => format!("{}{}?{}", self.base_url, path, query),
            None => format!("{}{}", self.base_url, path),
        }
    }

    pub async fn get(&self, path: &str, query: Option<&str>) -> RequestOutcome {
        let url = self.generate_path(path, query);
        tracing::debug!(url = %url, "gateway get");
        let request = self
            .client
            .get(&url)
            .header(reqwest::header::CONTENT_TYPE, "application/json");
        self.send(request).await
    }

    pub async fn post(&self, path: &str, query: Option<&str>, body: &Value) -> RequestOutcome {
        let url = self.generate_path(path, query);
        tracing::debug!(url = %url, "gateway post");
        self.send(self.client.post(&url).json(body)).await
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> RequestOutcome {
        let response = match request.send().await {
            Ok(response) => response,
            Err(error) => {
                let status = error.status().map(|status| status.as_u16());
                return failure(&error.to_string(), status);
            }
        };

        let status = response.status();
        let text = match response.text().await {
            Ok(text) => text,
            Err(error) => return failure(&error.to_string(), Some(status.as_u16())),
        };

        if !status.is_success() {
            tracing::warn!(status = status.as_u16(), "gateway request failed");
            let reason = format!("request failed with status {}", status);
            let mut value = failure(&reason, Some(status.as_u16())).into_value();
            value["body"] = parse_body(&text);
            return RequestOutcome::Failure(value);
        }

        RequestOutcome::Data(parse_body(&text))
    }
}

fn parse_body(text: &str) -> Value {
    if text.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

fn failure(reason: &str, status: Option<u16>) -> RequestOutcome {
    RequestOutcome::Failure(json!({ "error": reason, "status": status }))
}

/// Serves one canned HTTP response on a loopback port and returns its base url.
#[cfg(test)]
pub(crate) async fn serve_once(status_line: &'static str, body: String) -> String {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        let Ok((mut socket, _)) = listener.accept().await else {
            return;
        };
        let mut received = Vec::new();
        let mut chunk = [0_u8; 4096];
        loop {
            let Ok(read) = socket.read(&mut chunk).await else {
                return;
            };
            if read == 0 {
                break;
            }
            received.extend_from_slice(&chunk[..read]);
            let text = String::from_utf8_lossy(&received).to_string();
            if let Some(header_end) = text.find("\r\n\r\n") {
                let content_length = text[..header_end]
                    .lines()
                    .find_map(|line| {
                        let (name, value) = line.split_once(':')?;
                        name.eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse::<usize>().ok())
                            .flatten()
                    })
                    .unwrap_or(0);
                if received.len() >= header_end + 4 + content_length {
                    break;
                }
            }
        }
        let response = format!(
            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status_line,
            body.len(),
            body
        );
        let _ = socket.write_all(response.as_bytes()).await;
        let _ = socket.shutdown().await;
    });
    format!("http://{}", addr)
}

#[cfg(test)]
mod tests {
    use super::{serve_once, HttpGateway, RequestOutcome};
    use serde_json::json;

    #[test]
    fn generate_path_appends_query_only_when_present() {
        let gateway = HttpGateway::new("http://localhost:8080");
        assert_eq!(gateway.generate_path("/todos", None), "http://localhost:8080/todos");
        assert_eq!(gateway.generate_path("/todos", Some("")), "http://localhost:8080/todos");
        assert_eq!(
            gateway.generate_path("/todos", Some("page=2")),
            "http://localhost:8080/todos?page=2"
        );
    }

    #[tokio::test]
    async fn get_returns_parsed_data() {
        let base = serve_once("200 OK", json!({ "items": [1, 2] }).to_string()).await;
        let gateway = HttpGateway::new(base);
        let outcome = gateway.get("/items", Some("limit=2")).await;
        assert_eq!(outcome, RequestOutcome::Data(json!({ "items": [1, 2] })));
    }

    #[tokio::test]
    async fn post_failure_status_is_returned_as_value() {
        let body = json!({ "message": "boom" }).to_string();
        let base = serve_once("500 Internal Server Error", body).await;
        let gateway = HttpGateway::new(base);
        let outcome = gateway.post("/items", None, &json!({ "title": "x" })).await;

        assert!(outcome.is_failure());
        let value = outcome.into_value();
        assert_eq!(value["status"], json!(500));
        assert_eq!(value["body"]["message"], json!("boom"));
    }

    #[tokio::test]
    async fn unreachable_host_is_a_failure_value() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("addr");
        drop(listener);

        let gateway = HttpGateway::new(format!("http://{}", addr));
        let outcome = gateway.get("/anything", None).await;
        assert!(outcome.is_failure());
        assert!(outcome.data().is_none());
        assert!(outcome.into_value()["error"].is_string());
    }
}
