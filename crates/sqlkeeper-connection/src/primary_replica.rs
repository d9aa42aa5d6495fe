//! Primary / read-replica routing driver.
//!
//! [`PrimaryReplicaDriver`] is itself a [`Driver`], so wrapping it in a
//! [`KeeperConnection`](crate::KeeperConnection) gives read/write splitting
//! with the same reconnect-and-retry behaviour as a single connection.
//!
//! Routing rules:
//!
//! - reads go to a replica until something forces the primary;
//! - writes, transactions and `prepare` force the primary;
//! - once on the primary, reads stay there (read-your-writes) unless
//!   `keep_replica` is set and no transaction is open;
//! - `close` drops every connection and starts over on a replica.

use sqlkeeper_core::{Driver, PreparedStatement, Result, Row, Value};

/// Which underlying connection is currently in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Primary,
    Replica(usize),
}

/// Routes reads to replicas and everything else to the primary.
#[derive(Debug)]
pub struct PrimaryReplicaDriver<D> {
    primary: D,
    replicas: Vec<D>,
    current: Option<Target>,
    keep_replica: bool,
    next_replica: usize,
}

impl<D: Driver> PrimaryReplicaDriver<D> {
    /// Build a router. With no replicas every operation uses the primary.
    pub fn new(primary: D, replicas: Vec<D>) -> Self {
        Self {
            primary,
            replicas,
            current: None,
            keep_replica: false,
            next_replica: 0,
        }
    }

    /// Return reads to the replica after writes outside a transaction.
    pub fn keep_replica(mut self, keep: bool) -> Self {
        self.keep_replica = keep;
        self
    }

    pub fn current(&self) -> Option<Target> {
        self.current
    }

    pub fn is_connected_to_primary(&self) -> bool {
        self.current == Some(Target::Primary) && self.primary.is_connected()
    }

    pub fn primary(&self) -> &D {
        &self.primary
    }

    pub fn replicas(&self) -> &[D] {
        &self.replicas
    }

    /// Switch to the primary, connecting it if needed.
    pub fn ensure_connected_to_primary(&mut self) -> Result<bool> {
        let connected = self.primary.connect()?;
        if self.current != Some(Target::Primary) {
            tracing::debug!("Switching to primary connection");
        }
        self.current = Some(Target::Primary);
        Ok(connected)
    }

    /// Switch to a replica, connecting one if needed. Falls back to the
    /// primary when there are no replicas.
    pub fn ensure_connected_to_replica(&mut self) -> Result<bool> {
        if self.replicas.is_empty() {
            return self.ensure_connected_to_primary();
        }
        if let Some(Target::Replica(index)) = self.current {
            if self.replicas[index].is_connected() {
                return Ok(false);
            }
        }
        let index = self.next_replica % self.replicas.len();
        self.next_replica = self.next_replica.wrapping_add(1);
        let connected = self.replicas[index].connect()?;
        tracing::debug!(replica = index, "Using replica connection");
        self.current = Some(Target::Replica(index));
        Ok(connected)
    }

    fn reader(&mut self) -> Result<&mut D> {
        let stay_on_primary = self.current == Some(Target::Primary)
            && (!self.keep_replica || self.primary.transaction_nesting_level() > 0);
        if stay_on_primary {
            self.primary.connect()?;
        } else {
            self.ensure_connected_to_replica()?;
        }
        Ok(self.active())
    }

    fn writer(&mut self) -> Result<&mut D> {
        self.ensure_connected_to_primary()?;
        Ok(&mut self.primary)
    }

    fn active(&mut self) -> &mut D {
        match self.current {
            Some(Target::Replica(index)) => &mut self.replicas[index],
            _ => &mut self.primary,
        }
    }
}

impl<D: Driver> Driver for PrimaryReplicaDriver<D> {
    fn connect(&mut self) -> Result<bool> {
        match self.current {
            Some(Target::Primary) => self.primary.connect(),
            _ => self.ensure_connected_to_replica(),
        }
    }

    fn close(&mut self) {
        self.primary.close();
        for replica in &mut self.replicas {
            replica.close();
        }
        self.current = None;
    }

    fn is_connected(&self) -> bool {
        match self.current {
            Some(Target::Primary) => self.primary.is_connected(),
            Some(Target::Replica(index)) => self.replicas[index].is_connected(),
            None => false,
        }
    }

    fn query(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        self.reader()?.query(sql, params)
    }

    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64> {
        self.writer()?.execute(sql, params)
    }

    fn prepare(&mut self, sql: &str) -> Result<PreparedStatement> {
        self.writer()?.prepare(sql)
    }

    fn query_prepared(&mut self, stmt: &PreparedStatement, params: &[Value]) -> Result<Vec<Row>> {
        self.writer()?.query_prepared(stmt, params)
    }

    fn execute_prepared(&mut self, stmt: &PreparedStatement, params: &[Value]) -> Result<u64> {
        self.writer()?.execute_prepared(stmt, params)
    }

    fn begin(&mut self) -> Result<()> {
        self.writer()?.begin()
    }

    fn commit(&mut self) -> Result<()> {
        self.writer()?.commit()
    }

    fn rollback(&mut self) -> Result<()> {
        self.writer()?.rollback()
    }

    fn transaction_nesting_level(&self) -> u32 {
        self.primary.transaction_nesting_level()
    }
}
