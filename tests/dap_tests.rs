use std::io::Cursor;
use std::thread;
use std::time::{Duration, Instant};

use serde_json::{json, Value};
use step_debugger::config::Config;
use step_debugger::dap::{read_message, DapMessage, DapMessageContent, DapServer};

// Helper to decode everything the server has written so far
fn sent(server: &DapServer<Vec<u8>>) -> Vec<DapMessage> {
    let mut reader = Cursor::new(server.writer().clone());
    let mut messages = Vec::new();
    while let Some(msg) = read_message(&mut reader).unwrap() {
        messages.push(msg);
    }
    messages
}

fn events(messages: &[DapMessage], name: &str) -> Vec<Option<Value>> {
    messages
        .iter()
        .filter_map(|m| match &m.content {
            DapMessageContent::Event { event, body } if event == name => Some(body.clone()),
            _ => None,
        })
        .collect()
}

fn last_response(messages: &[DapMessage], name: &str) -> (bool, Option<Value>) {
    messages
        .iter()
        .rev()
        .find_map(|m| match &m.content {
            DapMessageContent::Response {
                command,
                success,
                body,
                ..
            } if command == name => Some((*success, body.clone())),
            _ => None,
        })
        .expect("no response for command")
}

// Pump until `count` events named `name` have been sent
fn pump_until(server: &mut DapServer<Vec<u8>>, name: &str, count: usize) {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        server.pump().unwrap();
        if events(&sent(server), name).len() >= count {
            return;
        }
        assert!(Instant::now() < deadline, "timed out waiting for {} #{}", name, count);
        thread::sleep(Duration::from_millis(2));
    }
}

fn request(server: &mut DapServer<Vec<u8>>, seq: u64, command: &str, arguments: Option<Value>) -> bool {
    server.handle(DapMessage::request(seq, command, arguments)).unwrap()
}

fn launched(source: &str) -> DapServer<Vec<u8>> {
    let mut server = DapServer::new(Vec::new(), Config::default());
    request(&mut server, 1, "initialize", None);
    request(&mut server, 2, "launch", Some(json!({"source": source, "name": "main.py"})));
    server
}

#[cfg(test)]
mod dap_tests {
    use super::*;

    #[test]
    fn test_initialize_sends_capabilities_then_initialized() {
        let mut server = DapServer::new(Vec::new(), Config::default());
        assert!(request(&mut server, 1, "initialize", None));

        let messages = sent(&server);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].msg_type, "response");
        let (success, body) = last_response(&messages, "initialize");
        assert!(success);
        assert_eq!(body.unwrap()["supportsConfigurationDoneRequest"], json!(true));
        assert_eq!(events(&messages, "initialized").len(), 1);
        // outgoing sequence numbers increase
        assert!(messages[0].seq < messages[1].seq);
    }

    #[test]
    fn test_step_through_program() {
        let mut server = launched("x = 1\nprint(x)\n");
        assert!(last_response(&sent(&server), "launch").0);

        pump_until(&mut server, "stopped", 1);
        let stopped = events(&sent(&server), "stopped");
        let first = stopped[0].clone().unwrap();
        assert_eq!(first["pause"], json!(1));
        assert_eq!(first["highlight"]["startLine"], json!(1));
        assert_eq!(first["loadedValue"]["repr"], json!("1"));

        request(&mut server, 3, "stackTrace", Some(json!({"threadId": 1})));
        let (success, body) = last_response(&sent(&server), "stackTrace");
        assert!(success);
        let body = body.unwrap();
        assert_eq!(body["stackFrames"][0]["name"], json!("<module>"));
        assert_eq!(body["stackFrames"][0]["line"], json!(1));

        request(&mut server, 4, "next", Some(json!({"threadId": 1})));
        pump_until(&mut server, "stopped", 2);

        request(&mut server, 5, "variables", Some(json!({"variablesReference": 2})));
        let (_, body) = last_response(&sent(&server), "variables");
        let variables = body.unwrap()["variables"].clone();
        assert!(variables
            .as_array()
            .unwrap()
            .iter()
            .any(|v| v["name"] == json!("x") && v["value"] == json!("1")));

        request(&mut server, 6, "next", Some(json!({"threadId": 1})));
        pump_until(&mut server, "terminated", 1);

        let messages = sent(&server);
        let output: String = events(&messages, "output")
            .into_iter()
            .filter_map(|b| b.and_then(|b| b["output"].as_str().map(str::to_string)))
            .collect();
        assert_eq!(output, "1\r\n");
        assert_eq!(events(&messages, "terminated")[0].clone().unwrap()["outcome"], json!("completed"));
        assert_eq!(events(&messages, "exited")[0].clone().unwrap()["exitCode"], json!(0));
        assert!(!request(&mut server, 7, "disconnect", None));
    }

    #[test]
    fn test_continue_runs_to_end() {
        let mut server = launched("a = 1\nb = 2\nc = a + b\n");
        pump_until(&mut server, "stopped", 1);

        request(&mut server, 3, "continue", Some(json!({"threadId": 1})));
        let (success, body) = last_response(&sent(&server), "continue");
        assert!(success);
        assert_eq!(body.unwrap()["allThreadsContinued"], json!(true));

        pump_until(&mut server, "terminated", 1);
        assert_eq!(events(&sent(&server), "stopped").len(), 1);
    }

    #[test]
    fn test_terminate_cancels_paused_run() {
        let mut server = launched("x = 1\ny = 2\n");
        pump_until(&mut server, "stopped", 1);

        request(&mut server, 3, "terminate", None);
        assert!(last_response(&sent(&server), "terminate").0);
        pump_until(&mut server, "terminated", 1);

        let messages = sent(&server);
        assert_eq!(events(&messages, "stopped").len(), 1);
        assert_eq!(events(&messages, "terminated")[0].clone().unwrap()["outcome"], json!("cancelled"));
        assert_eq!(events(&messages, "exited")[0].clone().unwrap()["exitCode"], json!(130));
    }

    #[test]
    fn test_runtime_error_is_reported() {
        let mut server = DapServer::new(Vec::new(), Config::default());
        request(
            &mut server,
            1,
            "launch",
            Some(json!({"source": "x = 1\nz = 2\ny = x / 0\n", "noDebug": true})),
        );
        pump_until(&mut server, "terminated", 1);

        let messages = sent(&server);
        let body = events(&messages, "terminated")[0].clone().unwrap();
        assert_eq!(body["outcome"], json!("failed"));
        assert_eq!(body["error"]["name"], json!("ZeroDivisionError"));
        assert_eq!(
            body["error"]["highlight"],
            json!({"startLine": 3, "startColumn": 5, "endLine": 3, "endColumn": 10})
        );
        assert!(events(&messages, "stopped").is_empty());
    }

    #[test]
    fn test_terminal_input_feeds_guest() {
        let mut server = launched("name = input()\nprint(name)\n");
        // stopped on the input() line; let it run
        pump_until(&mut server, "stopped", 1);
        request(&mut server, 3, "continue", None);

        let deadline = Instant::now() + Duration::from_secs(5);
        while !server.session().unwrap().bridge().is_pending() {
            assert!(Instant::now() < deadline, "guest never asked for input");
            thread::sleep(Duration::from_millis(2));
        }
        request(&mut server, 4, "terminalInput", Some(json!({"data": "ok\r"})));
        pump_until(&mut server, "terminated", 1);

        let output: String = events(&sent(&server), "output")
            .into_iter()
            .filter_map(|b| b.and_then(|b| b["output"].as_str().map(str::to_string)))
            .collect();
        assert_eq!(output, "ok\r\nok\r\n");
    }

    #[test]
    fn test_requests_without_run_fail() {
        let mut server = DapServer::new(Vec::new(), Config::default());
        request(&mut server, 1, "next", None);
        request(&mut server, 2, "stackTrace", None);
        request(&mut server, 3, "bogus", None);
        let messages = sent(&server);
        assert!(!last_response(&messages, "next").0);
        assert!(!last_response(&messages, "stackTrace").0);
        assert!(!last_response(&messages, "bogus").0);
    }

    #[test]
    fn test_disconnect_reports_interrupted_run() {
        let mut server = launched("x = 1\ny = 2\n");
        pump_until(&mut server, "stopped", 1);

        assert!(!request(&mut server, 3, "disconnect", None));
        let messages = sent(&server);
        assert_eq!(events(&messages, "terminated")[0].clone().unwrap()["outcome"], json!("cancelled"));
        assert_eq!(events(&messages, "exited").len(), 1);
        assert!(last_response(&messages, "disconnect").0);
        // the reply comes after the run's final events
        let last = messages.last().unwrap();
        assert!(matches!(&last.content, DapMessageContent::Response { command, .. } if command == "disconnect"));
    }
}
