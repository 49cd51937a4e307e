#![allow(dead_code)]

pub mod test_server {
    use std::sync::Once;

    /// Ensures May coroutines are configured only once
    static MAY_INIT: Once = Once::new();

    pub fn setup_may_runtime() {
        MAY_INIT.call_once(|| {
            may::config().set_stack_size(0x8000);
        });
    }
}

pub mod http {
    use std::io::{Read, Write};
    use std::net::{SocketAddr, TcpListener, TcpStream};
    use std::time::Duration;

    /// Reserve a loopback address for a test server to bind.
    pub fn free_addr() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        addr
    }

    /// Send a raw HTTP request and collect whatever comes back.
    pub fn send_request(addr: &SocketAddr, req: &str) -> String {
        let mut stream = TcpStream::connect(addr).unwrap();
        stream.write_all(req.as_bytes()).unwrap();
        stream
            .set_read_timeout(Some(Duration::from_millis(500)))
            .unwrap();
        let mut buf = Vec::new();
        loop {
            let mut tmp = [0u8; 1024];
            match stream.read(&mut tmp) {
                Ok(0) => break,
                Ok(n) => buf.extend_from_slice(&tmp[..n]),
                Err(ref e)
                    if e.kind() == std::io::ErrorKind::WouldBlock
                        || e.kind() == std::io::ErrorKind::TimedOut =>
                {
                    break
                }
                Err(e) => panic!("read error: {:?}", e),
            }
        }
        String::from_utf8_lossy(&buf).to_string()
    }

    /// Convenience for requests with a JSON body.
    pub fn send_json_request(addr: &SocketAddr, method: &str, path: &str, body: &str) -> String {
        let req = format!(
            "{method} {path} HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        send_request(addr, &req)
    }

    /// Split a raw response into status code and JSON body.
    pub fn parse_response(resp: &str) -> (u16, serde_json::Value) {
        let (status, _, body) = parse_response_full(resp);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap_or_default();
        (status, json)
    }

    /// Split a raw response into status, lowercase header pairs, and body.
    pub fn parse_response_full(resp: &str) -> (u16, Vec<(String, String)>, String) {
        let mut parts = resp.splitn(2, "\r\n\r\n");
        let head = parts.next().unwrap_or("");
        let body = parts.next().unwrap_or("").to_string();
        let mut status = 0;
        let mut headers = Vec::new();
        for (i, line) in head.lines().enumerate() {
            if i == 0 {
                status = line.split_whitespace().nth(1).unwrap_or("0").parse().unwrap_or(0);
            } else if let Some((name, value)) = line.split_once(':') {
                headers.push((name.trim().to_lowercase(), value.trim().to_string()));
            }
        }
        (status, headers, body)
    }

    pub fn header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
        headers
            .iter()
            .find(|(k, _)| k == &name.to_lowercase())
            .map(|(_, v)| v.as_str())
    }
}

pub mod mesh {
    use loadmesh::config::NodeConfig;
    use loadmesh::state::{ControllerState, NodeStatus};

    pub fn node(name: &str, ip: &str, agent_port: u16, web_port: u16) -> NodeConfig {
        NodeConfig {
            name: name.to_string(),
            ip: ip.to_string(),
            agent_port,
            web_port,
        }
    }

    pub fn alive_row(node: &NodeConfig, ping_ms: f64, cpu_load: f64) -> NodeStatus {
        NodeStatus {
            ip: node.ip.clone(),
            web_port: node.web_port,
            alive: true,
            ping_ms,
            current_users: 0,
            max_users: 100,
            cpu_load,
            temperature_c: None,
            watts: None,
            location: None,
            last_updated_ts: 1_700_000_000,
            last_error: None,
            maintenance: false,
        }
    }

    /// Controller state pre-seeded with one committed tick.
    pub fn seeded_state(rows: Vec<(NodeConfig, NodeStatus)>) -> ControllerState {
        let nodes: Vec<NodeConfig> = rows.iter().map(|(n, _)| n.clone()).collect();
        let state = ControllerState::new(nodes, "https://google.com".to_string());
        state.commit_tick(rows.into_iter().map(|(n, s)| (n.name, s)).collect());
        state
    }
}
