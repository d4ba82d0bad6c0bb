//! Query server: reads login attempts, fans them out to a worker pool and
//! writes one result line per attempt
//!
//! In concurrent mode a fixed number of workers take queries from a rendezvous
//! intake and hand results to a single writer task through a second
//! rendezvous. Result lines never interleave but can leave in a different
//! order than the queries arrived. Malformed lines are answered `BH` by the
//! reader directly and never occupy a worker.
//!
//! In sequential mode the reader decides each line inline so answers keep
//! input order.

use crate::auth::{Authorizer, PendingQuery};
use crate::error::{AuthError, Result};
use crate::server::handoff::{rendezvous, HandoffReceiver, HandoffSender};
use crate::server::protocol::{parse_raw_line, ParsedLine, ProtocolMode, Response, ResultRecord};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

/// Answer counters
#[derive(Debug, Default)]
pub struct ServerStats {
    ok: AtomicU64,
    err: AtomicU64,
    broken: AtomicU64,
}

/// Point-in-time copy of [`ServerStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub ok: u64,
    pub err: u64,
    pub broken: u64,
}

impl StatsSnapshot {
    pub fn total(&self) -> u64 {
        self.ok + self.err + self.broken
    }
}

impl ServerStats {
    fn count(&self, response: Response) {
        let counter = match response {
            Response::Ok => &self.ok,
            Response::Err => &self.err,
            Response::BrokenHelper => &self.broken,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            ok: self.ok.load(Ordering::Relaxed),
            err: self.err.load(Ordering::Relaxed),
            broken: self.broken.load(Ordering::Relaxed),
        }
    }
}

/// Fixed-size worker pool answering line protocol queries
pub struct QueryServer {
    authorizer: Arc<dyn Authorizer>,
    workers: usize,
    mode: ProtocolMode,
    stats: Arc<ServerStats>,
}

impl QueryServer {
    pub fn new(authorizer: Arc<dyn Authorizer>, workers: usize, mode: ProtocolMode) -> Result<Self> {
        if workers < 1 {
            return Err(AuthError::config("Query server needs at least one worker"));
        }
        Ok(Self {
            authorizer,
            workers,
            mode,
            stats: Arc::new(ServerStats::default()),
        })
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Serve until `input` reaches end of stream
    pub async fn run<R, W>(&self, input: R, output: W) -> Result<StatsSnapshot>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        match self.mode {
            ProtocolMode::Concurrent => self.run_concurrent(input, output).await?,
            ProtocolMode::Sequential => self.run_sequential(input, output).await?,
        }

        let stats = self.stats();
        info!(
            "Input closed after {} answers ({} OK, {} ERR, {} BH)",
            stats.total(),
            stats.ok,
            stats.err,
            stats.broken
        );
        Ok(stats)
    }

    async fn run_concurrent<R, W>(&self, input: R, output: W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (result_tx, result_rx) = rendezvous::<ResultRecord>();
        let (query_tx, query_rx) = rendezvous::<PendingQuery>();

        let writer = tokio::spawn(drain_results(result_rx, output));

        let workers: Vec<_> = (0..self.workers)
            .map(|id| {
                tokio::spawn(worker_loop(
                    id,
                    query_rx.clone(),
                    result_tx.clone(),
                    Arc::clone(&self.authorizer),
                    Arc::clone(&self.stats),
                ))
            })
            .collect();
        drop(query_rx);
        info!("Started {} auth workers", self.workers);

        let mut input = input;
        let mut line = Vec::new();
        let read_result = loop {
            match read_line(&mut input, &mut line).await {
                Ok(true) => {}
                Ok(false) => break Ok(()),
                Err(e) => break Err(e),
            }

            let handed_off = match parse_raw_line(&line, self.mode) {
                ParsedLine::Query(query) => query_tx.send(query).await,
                ParsedLine::Malformed { token } => {
                    debug!("Malformed line: {:?}", String::from_utf8_lossy(&line));
                    self.stats.count(Response::BrokenHelper);
                    result_tx
                        .send(ResultRecord::new(token, Response::BrokenHelper))
                        .await
                }
            };

            if handed_off.is_err() {
                warn!("Workers or result writer are gone, stopping input processing");
                break Ok(());
            }
        };

        // Closing the intake lets workers finish; closing results lets the writer finish
        drop(query_tx);
        for worker in workers {
            if let Err(e) = worker.await {
                warn!("Auth worker ended abnormally: {}", e);
            }
        }
        drop(result_tx);

        let write_result = writer
            .await
            .map_err(|e| AuthError::Internal(anyhow::anyhow!("Result writer task failed: {}", e)))?;

        read_result.and(write_result)
    }

    async fn run_sequential<R, W>(&self, input: R, mut output: W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut input = input;
        let mut line = Vec::new();
        while read_line(&mut input, &mut line).await? {
            let record = match parse_raw_line(&line, self.mode) {
                ParsedLine::Query(query) => {
                    let verdict = self.authorizer.authorize(&query).await;
                    ResultRecord::new(None, verdict.into())
                }
                ParsedLine::Malformed { token } => {
                    debug!("Malformed line: {:?}", String::from_utf8_lossy(&line));
                    ResultRecord::new(token, Response::BrokenHelper)
                }
            };
            self.stats.count(record.response);
            write_record(&mut output, &record).await?;
        }
        Ok(())
    }
}

/// Read the next line into `buf` without its `\n`; `false` at end of input
///
/// Lines are raw bytes so that undecodable input is answered, not fatal.
async fn read_line<R>(input: &mut R, buf: &mut Vec<u8>) -> Result<bool>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    if input.read_until(b'\n', buf).await? == 0 {
        return Ok(false);
    }
    if buf.last() == Some(&b'\n') {
        buf.pop();
    }
    Ok(true)
}

async fn worker_loop(
    id: usize,
    queries: HandoffReceiver<PendingQuery>,
    results: HandoffSender<ResultRecord>,
    authorizer: Arc<dyn Authorizer>,
    stats: Arc<ServerStats>,
) {
    debug!("Auth worker {} started", id);
    while let Some(query) = queries.recv().await {
        let verdict = authorizer.authorize(&query).await;
        let response = Response::from(verdict);
        stats.count(response);

        if results.send(ResultRecord::new(query.token, response)).await.is_err() {
            warn!("Auth worker {}: result writer is gone", id);
            break;
        }
    }
    debug!("Auth worker {} stopped", id);
}

async fn drain_results<W>(results: HandoffReceiver<ResultRecord>, mut output: W) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(record) = results.recv().await {
        write_record(&mut output, &record).await?;
    }
    Ok(())
}

async fn write_record<W>(output: &mut W, record: &ResultRecord) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let line = format!("{}\n", record);
    output.write_all(line.as_bytes()).await?;
    output.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{Snapshot, SnapshotAuthorizer, SnapshotHandle};
    use tokio::io::BufReader;

    fn server(workers: usize, mode: ProtocolMode) -> QueryServer {
        let snapshot = Snapshot::builder()
            .credential("10.0.0.1", "u1:p1")
            .master_password("m")
            .build();
        let authorizer = Arc::new(SnapshotAuthorizer::new(SnapshotHandle::fixed(snapshot)));
        QueryServer::new(authorizer, workers, mode).unwrap()
    }

    async fn serve(server: &QueryServer, input: &str) -> (Vec<String>, StatsSnapshot) {
        let (client, mut server_side) = tokio::io::duplex(64 * 1024);
        let stats = server
            .run(BufReader::new(input.as_bytes()), client)
            .await
            .unwrap();

        let mut out = String::new();
        tokio::io::AsyncReadExt::read_to_string(&mut server_side, &mut out)
            .await
            .unwrap();
        (out.lines().map(str::to_string).collect(), stats)
    }

    #[test]
    fn test_zero_workers_rejected() {
        let authorizer = Arc::new(SnapshotAuthorizer::new(SnapshotHandle::fixed(Snapshot::empty())));
        assert!(QueryServer::new(authorizer, 0, ProtocolMode::Concurrent).is_err());
    }

    #[tokio::test]
    async fn test_sequential_mode_keeps_order() {
        let server = server(4, ProtocolMode::Sequential);
        let input = "u1 p1 10.0.0.1 9.9.9.9\nu2 p2 10.0.0.1 9.9.9.9\nu1 p1 10.0.0.1 -\nm x 1 2 3\n";

        let (lines, stats) = serve(&server, input).await;

        assert_eq!(lines, vec!["OK", "ERR", "BH", "BH"]);
        assert_eq!(stats, StatsSnapshot { ok: 1, err: 1, broken: 2 });
    }

    #[tokio::test]
    async fn test_concurrent_mode_answers_every_channel() {
        let server = server(3, ProtocolMode::Concurrent);
        let mut input = String::new();
        for channel in 0..50 {
            if channel % 5 == 0 {
                input.push_str(&format!("{} u1 p1 10.0.0.1 -\n", channel));
            } else if channel % 2 == 0 {
                input.push_str(&format!("{} u1 p1 10.0.0.1 9.9.9.9\n", channel));
            } else {
                input.push_str(&format!("{} u2 p2 10.0.0.1 9.9.9.9\n", channel));
            }
        }

        let (lines, stats) = serve(&server, &input).await;

        assert_eq!(lines.len(), 50);
        let mut answers: Vec<(u32, String)> = lines
            .iter()
            .map(|line| {
                let (channel, answer) = line.split_once(' ').unwrap();
                (channel.parse().unwrap(), answer.to_string())
            })
            .collect();
        answers.sort();

        for (channel, answer) in answers.iter() {
            let expected = if channel % 5 == 0 {
                "BH"
            } else if channel % 2 == 0 {
                "OK"
            } else {
                "ERR"
            };
            assert_eq!(answer, expected, "channel {}", channel);
        }
        assert_eq!(stats.total(), 50);
        assert_eq!(stats.broken, 10);
    }

    #[tokio::test]
    async fn test_sequential_mode_writes_one_line_per_answer() {
        let server = server(1, ProtocolMode::Sequential);
        let input = tokio_test::io::Builder::new()
            .read(b"u1 p1 10.0.0.1 9.9.9.9\n")
            .read(b"u1 p1 10.0.0.2 9.9.9.9\n")
            .build();
        let output = tokio_test::io::Builder::new()
            .write(b"OK\n")
            .write(b"ERR\n")
            .build();

        let stats = server.run(BufReader::new(input), output).await.unwrap();
        assert_eq!(stats, StatsSnapshot { ok: 1, err: 1, broken: 0 });
    }

    #[tokio::test]
    async fn test_invalid_utf8_line_is_answered_and_serving_continues() {
        let input: &[u8] = b"0 u1 p1 10.0.0.1 9.9.9.9\n1 u\xff p 10.0.0.1 9.9.9.9\n2 u1 p1 10.0.0.1 9.9.9.9\n";

        for workers in [1, 3] {
            let server = server(workers, ProtocolMode::Concurrent);
            let (client, mut server_side) = tokio::io::duplex(64 * 1024);
            let stats = server.run(BufReader::new(input), client).await.unwrap();

            let mut out = String::new();
            tokio::io::AsyncReadExt::read_to_string(&mut server_side, &mut out)
                .await
                .unwrap();
            let mut lines: Vec<&str> = out.lines().collect();
            lines.sort_unstable();
            assert_eq!(lines, vec!["0 OK", "1 BH", "2 OK"]);
            assert_eq!(stats, StatsSnapshot { ok: 2, err: 0, broken: 1 });
        }

        let server = server(1, ProtocolMode::Sequential);
        let input: &[u8] = b"u1 p1 10.0.0.1 9.9.9.9\nu\xff p 10.0.0.1 9.9.9.9\nu1 p1 10.0.0.1 9.9.9.9";
        let (client, mut server_side) = tokio::io::duplex(64 * 1024);
        server.run(BufReader::new(input), client).await.unwrap();

        let mut out = String::new();
        tokio::io::AsyncReadExt::read_to_string(&mut server_side, &mut out)
            .await
            .unwrap();
        assert_eq!(out, "OK\nBH\nOK\n");
    }

    #[tokio::test]
    async fn test_empty_input() {
        let server = server(2, ProtocolMode::Concurrent);
        let (lines, stats) = serve(&server, "").await;
        assert!(lines.is_empty());
        assert_eq!(stats.total(), 0);
    }
}
