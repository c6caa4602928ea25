use line::write_flush;
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Send the final `221` reply and shut the connection down.
///
/// This is the only acceptable way to answer a `QUIT` command.
pub async fn bye<S: AsyncWrite + Unpin>(stream: &mut S, domain: &str) -> std::io::Result<()> {
    write_flush(
        stream,
        format!("221 {domain} Service closing transmission channel\r\n"),
    )
    .await?;
    stream.shutdown().await?;
    Ok(())
}
