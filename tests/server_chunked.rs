#[cfg(test)]
mod integration_tests {
    use gatekeepd::config::{AppConfig, RouteConfig, ServerConfig};
    use gatekeepd::core::context::Server;
    use gatekeepd::core::mainloop;
    use gatekeepd::core::signals::SignalPipe;
    use gatekeepd::http::Method;
    use mio::Poll;
    use std::error::Error;
    use std::io::{Read, Write};
    use std::net::TcpStream;
    use std::thread::sleep;
    use std::time::Duration;
    use std::{fs, thread};

    fn spawn_server(config: AppConfig) {
        thread::spawn(move || {
            let mut poll = Poll::new().unwrap();
            let mut signals = SignalPipe::register(&poll).unwrap();
            let mut server = Server::new(config, &poll).unwrap();
            mainloop::run(&mut server, &mut poll, &mut signals).unwrap();
        });
    }

    #[test]
    fn test_server_chunked_processing() {
        // --- 1. PREPARE DIRECTORY STRUCTURE ---
        let test_root = "./tmp_test_root";
        let upload_path = "./tmp_test_root/uploads";

        let _ = fs::remove_dir_all(test_root);
        fs::create_dir_all(upload_path).expect("Failed to create test directories");

        // --- 2. SETUP APP CONFIGURATION ---
        let mut config = AppConfig::default();

        let router1 = RouteConfig {
            path: "/upload".to_string(),
            root: test_root.to_string(),
            upload_dir: "uploads".to_string(),
            methods: vec![Method::POST.to_string(), Method::GET.to_string()],
            ..Default::default()
        };

        let server_cfg = ServerConfig {
            server_name: "127.0.0.1".to_string(),
            ports: vec![8180],
            root: test_root.to_string(),
            routes: vec![router1],
            default_server: true,
            client_max_body_size: 1024 * 1024,
            ..Default::default()
        };
        config.servers.push(server_cfg);

        // --- 3. START SERVER IN BACKGROUND ---
        spawn_server(config);

        thread::sleep(Duration::from_millis(300));

        // --- 4. CONNECT AND SEND CHUNKED REQUEST ---
        let mut stream = TcpStream::connect("127.0.0.1:8180").expect("Failed to connect to server");
        stream
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();

        let headers = "POST /upload/test.txt HTTP/1.1\r\n\
                       Host: 127.0.0.1:8180\r\n\
                       Transfer-Encoding: chunked\r\n\
                       Content-Type: text/plain\r\n\r\n";

        stream.write_all(headers.as_bytes()).unwrap();

        stream.write_all(b"5\r\nHello\r\n").unwrap();
        thread::sleep(Duration::from_millis(100));

        stream.write_all(b"7\r\n World!\r\n").unwrap();
        thread::sleep(Duration::from_millis(100));

        stream.write_all(b"0\r\n\r\n").unwrap();
        stream.flush().unwrap();

        // --- 5. READ RESPONSE ---
        let mut buffer = [0u8; 4096];
        match stream.read(&mut buffer) {
            Ok(n) => {
                let response = String::from_utf8_lossy(&buffer[..n]);
                assert!(response.contains("201 Created") || response.contains("200 OK"));
            }
            Err(e) => panic!("Failed to read response from server: {}", e),
        }

        // --- 6. VERIFY FILE ON DISK ---
        let paths = fs::read_dir(upload_path).unwrap();
        let mut found_content = false;

        for path in paths {
            let file_path = path.unwrap().path();
            if file_path.is_file() {
                let content = fs::read_to_string(&file_path).unwrap();
                if content == "Hello World!" {
                    found_content = true;
                }
            }
        }

        assert!(
            found_content,
            "Chunked data was not correctly assembled on disk."
        );

        let _ = fs::remove_dir_all(test_root);
    }

    #[test]
    fn test_pipelined_requests() {
        let test_root = "./tmp_pipeline_test";
        let _ = fs::remove_dir_all(test_root);
        fs::create_dir_all(test_root).unwrap();
        fs::write(format!("{}/index.html", test_root), "Hello").unwrap();

        let mut config = AppConfig::default();
        let router1 = RouteConfig {
            path: "/".to_string(),
            root: test_root.to_string(),
            methods: vec!["GET".to_string()],
            ..Default::default()
        };

        let server_cfg = ServerConfig {
            server_name: "localhost".to_string(),
            ports: vec![8181],
            root: test_root.to_string(),
            routes: vec![router1],
            default_server: true,
            ..Default::default()
        };
        config.servers.push(server_cfg);

        spawn_server(config);

        thread::sleep(Duration::from_millis(300));

        let mut stream = TcpStream::connect("127.0.0.1:8181").unwrap();
        stream
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();

        let pipeline_data = "GET /index.html HTTP/1.1\r\nHost: localhost\r\n\r\n\
                             GET /index.html HTTP/1.1\r\nHost: localhost\r\n\r\n";

        stream.write_all(pipeline_data.as_bytes()).unwrap();

        let mut buffer = [0u8; 4096];
        let n1 = stream.read(&mut buffer).unwrap();
        let res1 = String::from_utf8_lossy(&buffer[..n1]);

        assert!(
            res1.contains("200 OK"),
            "First response was not 200 OK. Check server logs."
        );

        if res1.matches("HTTP/1.1").count() < 2 {
            let n2 = stream.read(&mut buffer).unwrap();
            let res2 = String::from_utf8_lossy(&buffer[..n2]);
            assert!(res2.contains("200 OK"), "Second response was not 200 OK");
        }

        let _ = fs::remove_dir_all(test_root);
    }

    #[test]
    fn test_streaming_chunked_upload() -> Result<(), Box<dyn Error>> {
        let test_root = "./tmp_streaming_test";
        let upload_path = "./tmp_streaming_test/uploads";
        let _ = fs::remove_dir_all(test_root);
        fs::create_dir_all(upload_path)?;

        let mut config = AppConfig::default();
        let router1 = RouteConfig {
            path: "/upload".to_string(),
            root: test_root.to_string(),
            upload_dir: "uploads".to_string(),
            methods: vec![Method::POST.to_string()],
            ..Default::default()
        };
        let server_cfg = ServerConfig {
            server_name: "localhost".to_string(),
            ports: vec![8182],
            root: test_root.to_string(),
            routes: vec![router1],
            default_server: true,
            client_max_body_size: 1024 * 1024,
            ..Default::default()
        };
        config.servers.push(server_cfg);

        spawn_server(config);
        thread::sleep(Duration::from_millis(300));

        let addr = "127.0.0.1:8182";
        let mut stream = TcpStream::connect(addr)?;

        // 1. Send Headers
        let headers = "POST /upload/stream.txt HTTP/1.1\r\n\
                   Host: localhost\r\n\
                   Transfer-Encoding: chunked\r\n\
                   Content-Type: text/plain\r\n\r\n";
        stream.write_all(headers.as_bytes())?;
        stream.flush()?;
        sleep(Duration::from_millis(200));

        // 2. Send only the FIRST SIZE line
        stream.write_all(b"B\r\n")?; // Hex B = 11 bytes
        stream.flush()?;
        sleep(Duration::from_millis(200));

        // 3. Send the FIRST DATA, split from its size line
        stream.write_all(b"Rust Stream")?;
        stream.write_all(b"\r\n")?;
        stream.flush()?;
        sleep(Duration::from_millis(200));

        // 4. Send the TERMINAL chunk, split across writes
        stream.write_all(b"0\r\n")?;
        stream.flush()?;
        sleep(Duration::from_millis(200));

        stream.write_all(b"\r\n")?;
        stream.flush()?;

        let mut buffer = [0u8; 4096];
        stream.set_read_timeout(Some(Duration::from_secs(2)))?;
        let n = stream.read(&mut buffer)?;
        let response = String::from_utf8_lossy(&buffer[..n]);
        assert!(response.contains("201 Created") || response.contains("200 OK"));

        let _ = fs::remove_dir_all(test_root);
        Ok(())
    }
}
