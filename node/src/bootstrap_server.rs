//! Bootstrap TCP server.
//!
//! Serves the three pull protocols to peers synchronizing from us:
//! `bulk_pull` streams a chain slice newest-first, `frontier_req` streams
//! (account, head) pairs, `bulk_pull_account` streams receivable entries.
//! `bulk_push` accepts blocks the peer believes we are missing. Each
//! connection handles one request after the other until the peer closes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use keva_blocks::{Block, BlockType};
use keva_ledger::Ledger;
use keva_messages::{
    BulkPull, BulkPullAccount, FrontierReq, Message, MessageHeader, MessageType,
    PendingAddressFlag, HEADER_SIZE,
};
use keva_store::{AccountStore, PendingStore};
use keva_types::{unix_seconds, Account, BlockHash};

use crate::block_processor::BlockProcessor;

/// Read inactivity cutoff per request.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct BootstrapServer {
    ledger: Arc<Ledger>,
    processor: Arc<BlockProcessor>,
    stopped: Arc<AtomicBool>,
}

impl BootstrapServer {
    pub fn new(
        ledger: Arc<Ledger>,
        processor: Arc<BlockProcessor>,
        stopped: Arc<AtomicBool>,
    ) -> Self {
        Self {
            ledger,
            processor,
            stopped,
        }
    }

    /// Accept loop; spawns one task per connection.
    pub async fn run(self: Arc<Self>, listener: TcpListener) {
        while !self.stopped.load(Ordering::Acquire) {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    tracing::debug!(%peer, "bootstrap connection accepted");
                    let server = self.clone();
                    tokio::spawn(async move {
                        if let Err(err) = server.serve(stream).await {
                            tracing::debug!(%peer, %err, "bootstrap connection ended");
                        }
                    });
                }
                Err(err) => {
                    tracing::debug!(%err, "bootstrap accept failed");
                }
            }
        }
    }

    async fn serve(&self, mut stream: TcpStream) -> std::io::Result<()> {
        loop {
            let message = match self.read_request(&mut stream).await? {
                Some(message) => message,
                None => return Ok(()),
            };
            match message {
                Message::BulkPull(request) => self.serve_bulk_pull(&mut stream, request).await?,
                Message::FrontierReq(request) => {
                    self.serve_frontier_req(&mut stream, request).await?
                }
                Message::BulkPullAccount(request) => {
                    self.serve_bulk_pull_account(&mut stream, request).await?
                }
                Message::BulkPush => self.receive_push(&mut stream).await?,
                other => {
                    tracing::debug!(kind = ?other.message_type(), "unexpected bootstrap request");
                    return Ok(());
                }
            }
        }
    }

    /// Read one framed request, `None` on clean EOF.
    async fn read_request(&self, stream: &mut TcpStream) -> std::io::Result<Option<Message>> {
        let mut header_bytes = [0u8; HEADER_SIZE];
        match tokio::time::timeout(REQUEST_TIMEOUT, stream.read_exact(&mut header_bytes)).await {
            Ok(Ok(_)) => {}
            Ok(Err(err)) if err.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Ok(Err(err)) => return Err(err),
            Err(_) => return Ok(None),
        }
        let (raw, _) = match MessageHeader::deserialize(&header_bytes) {
            Some(parsed) => parsed,
            None => return Ok(None),
        };
        if !raw.valid_magic() || !raw.valid_network(self.ledger.network()) {
            return Ok(None);
        }
        let header = match raw.into_header(self.ledger.network()) {
            Some(header) => header,
            None => return Ok(None),
        };
        let body_len = match header.message_type {
            MessageType::BulkPull => {
                if header.flag(keva_messages::QUERY_FLAG) {
                    72
                } else {
                    64
                }
            }
            MessageType::FrontierReq => 40,
            MessageType::BulkPullAccount => 49,
            MessageType::BulkPush => 0,
            _ => return Ok(None),
        };
        let mut body = vec![0u8; body_len];
        if body_len > 0 {
            tokio::time::timeout(REQUEST_TIMEOUT, stream.read_exact(&mut body))
                .await
                .map_err(|_| std::io::Error::from(std::io::ErrorKind::TimedOut))??;
        }
        Ok(Message::deserialize_body(&header, &body))
    }

    /// Stream blocks from the requested head down to (exclusive) `end`.
    async fn serve_bulk_pull(
        &self,
        stream: &mut TcpStream,
        request: BulkPull,
    ) -> std::io::Result<()> {
        // `start` names either an account (pull its whole chain) or a block
        // hash (pull from that block down).
        let start_account = Account::from_bytes(*request.start.as_bytes());
        let mut current = match self.ledger.account_info(&start_account) {
            Ok(Some(info)) => info.head,
            _ => BlockHash::new(*request.start.as_bytes()),
        };
        let mut remaining = request.count.unwrap_or(u32::MAX);

        while !current.is_zero() && current != request.end && remaining > 0 {
            let stored = match self.ledger.block_get(&current) {
                Ok(Some(stored)) => stored,
                _ => break,
            };
            let mut frame = Vec::with_capacity(1 + 216);
            stored.block.serialize_with_type(&mut frame);
            stream.write_all(&frame).await?;
            current = stored.block.previous();
            remaining -= 1;
        }
        stream.write_all(&[BlockType::NotABlock as u8]).await?;
        stream.flush().await
    }

    /// Stream (account, head) pairs ascending from `start`, most recently
    /// modified within `age` seconds, terminated by a zero account.
    async fn serve_frontier_req(
        &self,
        stream: &mut TcpStream,
        request: FrontierReq,
    ) -> std::io::Result<()> {
        let accounts = match self.ledger.store().accounts_iter() {
            Ok(accounts) => accounts,
            Err(err) => {
                tracing::error!(%err, "frontier walk failed");
                return Ok(());
            }
        };
        let now = unix_seconds();
        let mut sent = 0u32;
        for (account, info) in accounts {
            if account.as_bytes() < request.start.as_bytes() || sent >= request.count {
                continue;
            }
            if request.age != u32::MAX && now.saturating_sub(info.modified) > request.age as u64 {
                continue;
            }
            stream.write_all(account.as_bytes()).await?;
            stream.write_all(info.head.as_bytes()).await?;
            sent += 1;
        }
        stream.write_all(&[0u8; 64]).await?;
        stream.flush().await
    }

    /// Stream the frontier pair then receivable entries for one account.
    async fn serve_bulk_pull_account(
        &self,
        stream: &mut TcpStream,
        request: BulkPullAccount,
    ) -> std::io::Result<()> {
        let (head, balance) = match self.ledger.account_info(&request.account) {
            Ok(Some(info)) => (info.head, info.balance),
            _ => (BlockHash::ZERO, keva_types::Amount::ZERO),
        };
        stream.write_all(head.as_bytes()).await?;
        stream.write_all(&balance.to_be_bytes()).await?;

        let pending = self
            .ledger
            .store()
            .pending_for_account(&request.account)
            .unwrap_or_default();
        for (key, info) in pending {
            if info.amount < request.minimum_amount {
                continue;
            }
            match request.flags {
                PendingAddressFlag::PendingHashAndAmount => {
                    stream.write_all(key.hash.as_bytes()).await?;
                    stream.write_all(&info.amount.to_be_bytes()).await?;
                }
                PendingAddressFlag::PendingAddressOnly => {
                    stream.write_all(info.source.as_bytes()).await?;
                }
                PendingAddressFlag::PendingHashAmountAndAddress => {
                    stream.write_all(key.hash.as_bytes()).await?;
                    stream.write_all(&info.amount.to_be_bytes()).await?;
                    stream.write_all(info.source.as_bytes()).await?;
                }
            }
        }
        // Terminator sized to the entry shape of the requested mode.
        let terminator_len = match request.flags {
            PendingAddressFlag::PendingHashAndAmount => 48,
            PendingAddressFlag::PendingAddressOnly => 32,
            PendingAddressFlag::PendingHashAmountAndAddress => 80,
        };
        stream.write_all(&vec![0u8; terminator_len]).await?;
        stream.flush().await
    }

    /// Accept pushed blocks until the not_a_block terminator.
    async fn receive_push(&self, stream: &mut TcpStream) -> std::io::Result<()> {
        loop {
            let mut type_byte = [0u8; 1];
            tokio::time::timeout(REQUEST_TIMEOUT, stream.read_exact(&mut type_byte))
                .await
                .map_err(|_| std::io::Error::from(std::io::ErrorKind::TimedOut))??;
            let block_type = match BlockType::from_u8(type_byte[0]) {
                Some(BlockType::NotABlock) => return Ok(()),
                Some(block_type) => block_type,
                None => return Ok(()),
            };
            let size = match block_type.body_size() {
                Some(size) => size,
                None => return Ok(()),
            };
            let mut body = vec![0u8; size];
            tokio::time::timeout(REQUEST_TIMEOUT, stream.read_exact(&mut body))
                .await
                .map_err(|_| std::io::Error::from(std::io::ErrorKind::TimedOut))??;
            match Block::deserialize(block_type, &body) {
                Some(block) => self.processor.add(Arc::new(block)),
                None => return Ok(()),
            }
        }
    }
}
