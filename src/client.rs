//! Relay client
//!
//! Sends one command line to a running daemon and reads its one-line reply.

use crate::error::ApiError;
use crate::executor::Reply;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::debug;

pub async fn send_command(addr: &str, line: &str) -> Result<Reply, ApiError> {
    let mut stream = TcpStream::connect(addr)
        .await
        .map_err(|e| ApiError::io(format!("connect to {}", addr), e))?;
    stream
        .write_all(format!("{}\n", line.trim_end()).as_bytes())
        .await
        .map_err(|e| ApiError::io("send command", e))?;

    let mut response = String::new();
    BufReader::new(stream)
        .read_line(&mut response)
        .await
        .map_err(|e| ApiError::io("read reply", e))?;
    debug!(command = %line, response = %response.trim_end(), "Relay replied");

    match response.trim_end() {
        "success" => Ok(Reply::Success),
        "fail" => Ok(Reply::Fail),
        other => Err(ApiError::MalformedInput(format!(
            "unexpected reply {:?}",
            other
        ))),
    }
}
