//! Minimal stdio MCP server used by the integration tests.
//!
//! Tools: `add`, `echo`, `env`, `fail`, `rpc_error`, `slow`, `split`, `chatty`,
//! `exit`. `FIXTURE_MODE` selects a misbehaving handshake (`garbage`, `exit`,
//! `silent`, `reject`) or `banner`, which prints a plain-text line before
//! every reply.

use std::io::{self, BufRead, Write};
use std::thread;
use std::time::Duration;

use serde_json::{Value, json};

fn main() -> io::Result<()> {
    let mode = std::env::var("FIXTURE_MODE").unwrap_or_default();
    if mode == "exit" {
        return Ok(());
    }

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = line?;
        let Ok(request) = serde_json::from_str::<Value>(&line) else {
            continue;
        };
        let Some(id) = request.get("id").cloned() else {
            // Notification.
            continue;
        };
        let method = request.get("method").and_then(Value::as_str).unwrap_or("");

        let reply = match method {
            "initialize" => match mode.as_str() {
                "garbage" => {
                    writeln!(stdout, "{{this is not json")?;
                    stdout.flush()?;
                    continue;
                }
                "silent" => continue,
                "reject" => error(&id, -32600, "not today"),
                _ => result(
                    &id,
                    json!({
                        "protocolVersion": "2024-11-05",
                        "capabilities": {"tools": {}},
                        "serverInfo": {"name": "fixture", "version": "0.0.1"}
                    }),
                ),
            },
            "tools/list" => result(&id, json!({ "tools": tools() })),
            "tools/call" => {
                let params = request.get("params").cloned().unwrap_or(Value::Null);
                let name = params.get("name").and_then(Value::as_str).unwrap_or("");
                let args = params.get("arguments").cloned().unwrap_or(json!({}));
                match name {
                    "exit" => return Ok(()),
                    "split" => {
                        // Half a reply, a pause, then the rest.
                        let line = text(&id, "split done").to_string();
                        let (head, tail) = line.split_at(line.len() / 2);
                        write!(stdout, "{head}")?;
                        stdout.flush()?;
                        thread::sleep(Duration::from_millis(millis(&args)));
                        writeln!(stdout, "{tail}")?;
                        stdout.flush()?;
                        continue;
                    }
                    "chatty" => {
                        send(&mut stdout, &json!({"jsonrpc": "2.0", "method": "notifications/progress"}))?;
                        send(&mut stdout, &json!({"jsonrpc": "2.0", "id": "srv-1", "method": "ping"}))?;
                        text(&id, "done talking")
                    }
                    _ => call(&id, name, &args),
                }
            }
            other => error(&id, -32601, &format!("unknown method {other}")),
        };

        if mode == "banner" {
            writeln!(stdout, "fixture server ready")?;
        }
        send(&mut stdout, &reply)?;
    }

    Ok(())
}

fn send(stdout: &mut io::Stdout, message: &Value) -> io::Result<()> {
    writeln!(stdout, "{message}")?;
    stdout.flush()
}

fn call(id: &Value, name: &str, args: &Value) -> Value {
    match name {
        "add" => {
            let a = args.get("a").and_then(Value::as_i64);
            let b = args.get("b").and_then(Value::as_i64);
            match (a, b) {
                (Some(a), Some(b)) => text(id, &(a + b).to_string()),
                _ => tool_error(id, "add needs integer a and b"),
            }
        }
        "echo" => text(id, args.get("text").and_then(Value::as_str).unwrap_or("")),
        "env" => {
            let key = args.get("name").and_then(Value::as_str).unwrap_or("");
            text(id, &std::env::var(key).unwrap_or_default())
        }
        "fail" => tool_error(id, "boom"),
        "rpc_error" => error(id, -32000, "backend unavailable"),
        "slow" => {
            let ms = millis(args);
            thread::sleep(Duration::from_millis(ms));
            text(id, &format!("slept {ms}ms"))
        }
        other => error(id, -32602, &format!("unknown tool {other}")),
    }
}

fn millis(args: &Value) -> u64 {
    args.get("ms").and_then(Value::as_u64).unwrap_or(100)
}

fn tools() -> Value {
    json!([
        {
            "name": "add",
            "description": "Add two integers",
            "inputSchema": {
                "type": "object",
                "properties": {"a": {"type": "integer"}, "b": {"type": "integer"}},
                "required": ["a", "b"]
            }
        },
        {
            "name": "echo",
            "description": "Echo text back",
            "inputSchema": {
                "type": "object",
                "properties": {"text": {"type": "string"}},
                "required": ["text"]
            }
        },
        {
            "name": "env",
            "description": "Read an environment variable",
            "inputSchema": {"type": "object", "properties": {"name": {"type": "string"}}}
        },
        {"name": "fail", "description": "Always fails", "inputSchema": {"type": "object"}},
        {"name": "rpc_error", "description": "Protocol-level failure", "inputSchema": {"type": "object"}},
        {
            "name": "slow",
            "description": "Sleep before answering",
            "inputSchema": {"type": "object", "properties": {"ms": {"type": "integer", "default": 100}}}
        },
        {
            "name": "split",
            "description": "Answer in two pieces with a pause between",
            "inputSchema": {"type": "object", "properties": {"ms": {"type": "integer", "default": 100}}}
        },
        {"name": "chatty", "description": "Talks before answering", "inputSchema": {"type": "object"}},
        {"name": "exit", "description": "Exit without answering", "inputSchema": {"type": "object"}}
    ])
}

fn result(id: &Value, result: Value) -> Value {
    json!({"jsonrpc": "2.0", "id": id, "result": result})
}

fn text(id: &Value, text: &str) -> Value {
    result(id, json!({"content": [{"type": "text", "text": text}]}))
}

fn tool_error(id: &Value, message: &str) -> Value {
    result(id, json!({"content": [{"type": "text", "text": message}], "isError": true}))
}

fn error(id: &Value, code: i64, message: &str) -> Value {
    json!({"jsonrpc": "2.0", "id": id, "error": {"code": code, "message": message}})
}
