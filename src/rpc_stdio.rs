//! Purpose: Run the introspection JSON-RPC server over stdio transport.
//! Exports: `serve`.
//! Role: Bridge newline-delimited JSON-RPC lines to the shared dispatcher.
//! Invariants: stdout only emits JSON-RPC messages (one JSON value per line).
//! Invariants: stdin EOF exits cleanly without side effects.
//! Invariants: Parse/protocol errors are surfaced as JSON-RPC error responses.

use std::io::{self, BufRead, BufReader, BufWriter, Write};

use red_introspect::api::{Error, ErrorKind};
use red_introspect::rpc::{
    DispatchOutcome, IntrospectionHandler, JsonRpcError, JsonRpcId, JsonRpcResponse,
    RpcDispatcher, RpcHandler, parse_jsonrpc_line,
};
use serde_json::Value;
use tracing::{debug, info};

pub(super) fn serve() -> Result<(), Error> {
    let stdin = io::stdin();
    let stdout = io::stdout();
    let reader = BufReader::new(stdin.lock());
    let writer = BufWriter::new(stdout.lock());
    info!("serving JSON-RPC on stdio");
    serve_lines(
        reader,
        writer,
        &mut RpcDispatcher::new(IntrospectionHandler),
    )
}

fn serve_lines<R, W, H>(
    mut reader: R,
    mut writer: W,
    dispatcher: &mut RpcDispatcher<H>,
) -> Result<(), Error>
where
    R: BufRead,
    W: Write,
    H: RpcHandler,
{
    let mut line = String::new();
    loop {
        line.clear();
        let read = reader.read_line(&mut line).map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("failed to read JSON-RPC request")
                .with_source(err)
        })?;
        if read == 0 {
            debug!("stdin closed");
            return writer.flush().map_err(|err| {
                Error::new(ErrorKind::Io)
                    .with_message("failed to flush JSON-RPC output")
                    .with_source(err)
            });
        }

        let message = line.trim_end_matches(['\n', '\r']);
        if message.trim().is_empty() {
            continue;
        }

        let request = match parse_jsonrpc_line(message) {
            Ok(value) => value,
            Err(error) => {
                write_parse_error(&mut writer, error)?;
                continue;
            }
        };

        match dispatcher.dispatch_value(request) {
            DispatchOutcome::NoResponse => {}
            DispatchOutcome::Response(response) => {
                let payload = serde_json::to_value(response).map_err(|err| {
                    Error::new(ErrorKind::Internal)
                        .with_message("failed to encode JSON-RPC response")
                        .with_source(err)
                })?;
                write_json_line(&mut writer, &payload)?;
            }
        }
    }
}

fn write_json_line<W: Write>(writer: &mut W, payload: &Value) -> Result<(), Error> {
    serde_json::to_writer(&mut *writer, payload).map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message("failed to encode JSON-RPC message")
            .with_source(err)
    })?;
    writer.write_all(b"\n").map_err(|err| {
        Error::new(ErrorKind::Io)
            .with_message("failed to write JSON-RPC message")
            .with_source(err)
    })?;
    writer.flush().map_err(|err| {
        Error::new(ErrorKind::Io)
            .with_message("failed to flush JSON-RPC message")
            .with_source(err)
    })
}

fn write_parse_error<W: Write>(writer: &mut W, error: JsonRpcError) -> Result<(), Error> {
    let response = JsonRpcResponse::error(JsonRpcId::Null, error);
    let payload = serde_json::to_value(response).map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message("failed to encode JSON-RPC parse error")
            .with_source(err)
    })?;
    write_json_line(writer, &payload)
}
