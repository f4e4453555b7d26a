use log::{debug, info};
use std::future::pending;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{self, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{sleep, Instant, Sleep};

pub const BUFFER_SIZE: usize = 4096;

#[derive(Debug, Error)]
pub enum PumpError {
    #[error("failed to read local input")]
    InputRead(#[source] io::Error),
    #[error("failed to read from the connection")]
    ConnectionRead(#[source] io::Error),
    #[error("failed to write to the connection")]
    ConnectionWrite(#[source] io::Error),
    #[error("failed to write local output")]
    OutputWrite(#[source] io::Error),
    #[error("reader task ended abnormally")]
    Reader(#[from] JoinError),
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Summary {
    pub bytes_to_remote: u64,
    pub bytes_from_remote: u64,
}

impl Summary {
    pub fn nothing_read(&self) -> bool {
        self.bytes_from_remote == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Active,
    Draining,
}

/// Armed once local input is exhausted; remote output pushes the deadline back.
struct ShutdownTimer {
    timeout: Duration,
    deadline: Option<Pin<Box<Sleep>>>,
}

impl ShutdownTimer {
    fn new(timeout: Duration) -> Self {
        ShutdownTimer {
            timeout,
            deadline: None,
        }
    }

    fn arm(&mut self) {
        self.deadline = Some(Box::pin(sleep(self.timeout)));
    }

    fn reset(&mut self) {
        if let Some(deadline) = self.deadline.as_mut() {
            deadline.as_mut().reset(Instant::now() + self.timeout);
        }
    }

    async fn fired(&mut self) {
        match self.deadline.as_mut() {
            Some(deadline) => deadline.await,
            None => pending().await,
        }
    }
}

/// Aborts the reader when dropped, so every exit path releases its half of the stream.
struct ReaderTask(JoinHandle<io::Result<()>>);

impl ReaderTask {
    fn spawn<R>(reader: R, chunks: mpsc::Sender<Vec<u8>>) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        ReaderTask(tokio::spawn(read_chunks(reader, chunks)))
    }

    async fn finish(&mut self) -> Result<io::Result<()>, JoinError> {
        (&mut self.0).await
    }
}

impl Drop for ReaderTask {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Forwards reads in order until EOF; the channel closes when this returns.
async fn read_chunks<R>(mut reader: R, chunks: mpsc::Sender<Vec<u8>>) -> io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; BUFFER_SIZE];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        if chunks.send(buf[..n].to_vec()).await.is_err() {
            // coordinator already finished
            return Ok(());
        }
    }
}

/// Relays `input` to `conn` and `conn` to `output` until local input is done
/// and the remote has been quiet for `response_timeout`.
///
/// The connection is written only from this loop and read only by the server
/// reader task. Any I/O failure other than EOF ends the session with an error.
pub async fn pump<C, I, O>(
    conn: C,
    input: I,
    output: &mut O,
    response_timeout: Duration,
) -> Result<Summary, PumpError>
where
    C: AsyncRead + AsyncWrite + Send + 'static,
    I: AsyncRead + Send + Unpin + 'static,
    O: AsyncWrite + Unpin,
{
    let (conn_reader, mut conn_writer) = io::split(conn);
    let (request_tx, mut request_rx) = mpsc::channel::<Vec<u8>>(1);
    let (response_tx, mut response_rx) = mpsc::channel::<Vec<u8>>(1);

    let mut input_task = ReaderTask::spawn(input, request_tx);
    let mut server_task = ReaderTask::spawn(conn_reader, response_tx);

    let mut state = State::Active;
    let mut timer = ShutdownTimer::new(response_timeout);
    let mut server_open = true;
    let mut summary = Summary::default();

    loop {
        tokio::select! {
            request = request_rx.recv(), if state == State::Active => match request {
                Some(chunk) => {
                    conn_writer
                        .write_all(&chunk)
                        .await
                        .map_err(PumpError::ConnectionWrite)?;
                    summary.bytes_to_remote += chunk.len() as u64;
                }
                None => {
                    input_task.finish().await?.map_err(PumpError::InputRead)?;
                    debug!(
                        "[proxy_io] local input exhausted, waiting up to {:?} for the remote",
                        response_timeout
                    );
                    state = State::Draining;
                    timer.arm();
                }
            },
            response = response_rx.recv(), if server_open => match response {
                Some(chunk) => {
                    output
                        .write_all(&chunk)
                        .await
                        .map_err(PumpError::OutputWrite)?;
                    output.flush().await.map_err(PumpError::OutputWrite)?;
                    summary.bytes_from_remote += chunk.len() as u64;
                    if state == State::Draining {
                        timer.reset();
                    }
                }
                None => {
                    server_open = false;
                    server_task.finish().await?.map_err(PumpError::ConnectionRead)?;
                    debug!("[proxy_io] remote closed the connection");
                }
            },
            _ = timer.fired(), if state == State::Draining => {
                if summary.nothing_read() {
                    info!("nothing read, likely a connection or timeout problem");
                }
                break;
            }
        }
    }

    debug!(
        "[proxy_io] bytes_to_remote={} bytes_from_remote={}",
        summary.bytes_to_remote, summary.bytes_from_remote
    );
    Ok(summary)
}
