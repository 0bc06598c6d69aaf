fn main() {
    println!("Run `cargo test -p upload-flow` to execute end-to-end upload tests.");
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::io::Write;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use tempfile::NamedTempFile;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    use modelup_client::HttpTransport;
    use modelup_transfer::{UploadEvent, UploadStatus, Uploader};

    /// In-memory stand-in for the upload server.
    ///
    /// Answers the same four endpoints the real server exposes, tracks which
    /// chunk numbers it has stored, and reports progress on the status
    /// endpoint as a percentage (the tighter of the two shapes clients must
    /// handle).
    #[derive(Default)]
    struct ServerState {
        total_chunks: u32,
        received: HashSet<u32>,
        chunk_log: Vec<u32>,
        cleanup_calls: u32,
    }

    impl ServerState {
        fn shared() -> Arc<Mutex<Self>> {
            Arc::new(Mutex::new(Self::default()))
        }
    }

    async fn spawn_server(state: Arc<Mutex<ServerState>>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                let state = Arc::clone(&state);
                tokio::spawn(handle_connection(stream, state));
            }
        });
        format!("http://{addr}")
    }

    async fn handle_connection(mut stream: TcpStream, state: Arc<Mutex<ServerState>>) {
        let Some((head, body)) = read_request(&mut stream).await else {
            return;
        };
        let mut parts = head.lines().next().unwrap_or_default().split_whitespace();
        let method = parts.next().unwrap_or_default().to_string();
        let path = parts.next().unwrap_or_default().to_string();
        let payload = route(&method, &path, &body, &state);
        let response = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{payload}",
            payload.len()
        );
        let _ = stream.write_all(response.as_bytes()).await;
    }

    /// Reads one HTTP request: headers up to the blank line, then exactly
    /// `Content-Length` body bytes.
    async fn read_request(stream: &mut TcpStream) -> Option<(String, Vec<u8>)> {
        let mut buf = Vec::new();
        let mut tmp = [0u8; 4096];
        let header_end = loop {
            if let Some(pos) = find_subsequence(&buf, b"\r\n\r\n") {
                break pos + 4;
            }
            let n = stream.read(&mut tmp).await.ok()?;
            if n == 0 {
                return None;
            }
            buf.extend_from_slice(&tmp[..n]);
        };
        let head = String::from_utf8_lossy(&buf[..header_end]).into_owned();
        let content_length = head
            .lines()
            .find_map(|line| {
                let (name, value) = line.split_once(':')?;
                if name.eq_ignore_ascii_case("content-length") {
                    value.trim().parse::<usize>().ok()
                } else {
                    None
                }
            })
            .unwrap_or(0);
        let mut body = buf[header_end..].to_vec();
        while body.len() < content_length {
            let n = stream.read(&mut tmp).await.ok()?;
            if n == 0 {
                break;
            }
            body.extend_from_slice(&tmp[..n]);
        }
        Some((head, body))
    }

    fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
        haystack
            .windows(needle.len())
            .position(|window| window == needle)
    }

    fn route(method: &str, path: &str, body: &[u8], state: &Arc<Mutex<ServerState>>) -> String {
        match (method, path) {
            ("POST", "/api/upload/init/") => {
                let req: serde_json::Value = serde_json::from_slice(body).unwrap();
                let mut st = state.lock().unwrap();
                st.total_chunks = req["total_chunks"].as_u64().unwrap() as u32;
                st.received.clear();
                st.chunk_log.clear();
                r#"{"file_id": 7, "status": "initialized"}"#.to_string()
            }
            ("POST", "/api/upload/chunk/") => {
                let number = multipart_field(body, "chunk_number")
                    .and_then(|v| v.parse::<u32>().ok())
                    .expect("chunk request carries a chunk_number field");
                let mut st = state.lock().unwrap();
                st.received.insert(number);
                st.chunk_log.push(number);
                let progress =
                    st.received.len() as f64 / st.total_chunks.max(1) as f64 * 100.0;
                if st.received.len() as u32 == st.total_chunks {
                    format!(
                        r#"{{"status": "success", "progress": {progress}, "upload_status": "completed", "file_path": "uploads/7/model.obj"}}"#
                    )
                } else {
                    format!(
                        r#"{{"status": "success", "progress": {progress}, "upload_status": "pending"}}"#
                    )
                }
            }
            ("GET", "/api/upload/status/7/") => {
                let st = state.lock().unwrap();
                let progress =
                    st.received.len() as f64 / st.total_chunks.max(1) as f64 * 100.0;
                format!(r#"{{"status": "uploading", "progress": {progress}}}"#)
            }
            ("DELETE", "/api/upload/cleanup/7/") => {
                let mut st = state.lock().unwrap();
                st.received.clear();
                st.cleanup_calls += 1;
                r#"{"status": "deleted"}"#.to_string()
            }
            _ => r#"{"error": "not found"}"#.to_string(),
        }
    }

    /// Pulls a text field out of a multipart body without a full parser.
    fn multipart_field(body: &[u8], name: &str) -> Option<String> {
        let text = String::from_utf8_lossy(body);
        let marker = format!("name=\"{name}\"");
        let at = text.find(&marker)?;
        let rest = &text[at..];
        let start = rest.find("\r\n\r\n")? + 4;
        let end = rest[start..].find('\r')? + start;
        Some(rest[start..end].to_string())
    }

    fn temp_file(len: usize) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        let data: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
        file.write_all(&data).unwrap();
        file.flush().unwrap();
        file
    }

    fn uploader_for(base: &str, pacing: Duration) -> Uploader {
        let transport = Arc::new(HttpTransport::new(base).unwrap());
        Uploader::new(transport)
            .with_chunk_size(1000)
            .with_pacing(pacing)
    }

    // ---

    #[tokio::test]
    async fn full_upload_completes_and_resolves_media_url() {
        let state = ServerState::shared();
        let base = spawn_server(Arc::clone(&state)).await;
        let file = temp_file(2500);

        let uploader = uploader_for(&base, Duration::from_millis(1));
        uploader.start(file.path()).await.unwrap();

        let snapshot = uploader.snapshot().unwrap();
        assert_eq!(snapshot.status, UploadStatus::Completed);
        assert_eq!(snapshot.total_chunks, 3);
        assert_eq!(
            snapshot.result_location.as_deref(),
            Some(format!("{base}/media/uploads/7/model.obj").as_str())
        );
        assert_eq!(state.lock().unwrap().chunk_log, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn pause_and_resume_sends_each_chunk_exactly_once() {
        let state = ServerState::shared();
        let base = spawn_server(Arc::clone(&state)).await;
        let file = temp_file(2500);

        let uploader = Arc::new(uploader_for(&base, Duration::from_millis(300)));
        let mut events = uploader.take_events().unwrap();

        let runner = {
            let uploader = Arc::clone(&uploader);
            let path = file.path().to_path_buf();
            tokio::spawn(async move { uploader.start(&path).await })
        };

        // The loop paces for 300ms after each acknowledged chunk, so pausing
        // right after the second ack lands well before chunk 2 goes out.
        while let Some(event) = events.recv().await {
            if matches!(event, UploadEvent::Progress { chunk_index: 1, .. }) {
                break;
            }
        }
        uploader.pause().unwrap();
        runner.await.unwrap().unwrap();

        let session = uploader.session().unwrap();
        assert_eq!(session.status(), UploadStatus::Paused);
        assert_eq!(session.next_chunk_index(), 2);

        uploader.resume().await.unwrap();
        assert_eq!(session.status(), UploadStatus::Completed);
        assert_eq!(
            session.result_location().as_deref(),
            Some(format!("{base}/media/uploads/7/model.obj").as_str())
        );

        // Nothing the server already held was sent again.
        assert_eq!(state.lock().unwrap().chunk_log, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn abandoned_upload_asks_server_to_discard_the_session() {
        let state = ServerState::shared();
        let base = spawn_server(Arc::clone(&state)).await;
        let file = temp_file(2500);

        let uploader = Arc::new(uploader_for(&base, Duration::from_millis(300)));
        let mut events = uploader.take_events().unwrap();

        let runner = {
            let uploader = Arc::clone(&uploader);
            let path = file.path().to_path_buf();
            tokio::spawn(async move { uploader.start(&path).await })
        };

        while let Some(event) = events.recv().await {
            if matches!(event, UploadEvent::Progress { chunk_index: 0, .. }) {
                break;
            }
        }
        uploader.pause().unwrap();
        runner.await.unwrap().unwrap();

        uploader.abandon().await.unwrap();
        let st = state.lock().unwrap();
        assert_eq!(st.cleanup_calls, 1);
        assert!(st.received.is_empty());
    }
}
