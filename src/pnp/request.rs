use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::mem;
use core::sync::atomic::{AtomicU64, Ordering};
use spin::RwLock;

use crate::filter::FilterTicket;
use crate::platform::Platform;
use crate::pnp::device::{DeviceRecord, RemoveLockToken};
use crate::pnp::{PnpMinorFunction, PowerRequest};
use crate::status::DriverStatus;
use crate::structs::event::Event;

static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

pub type RequestHandle = Arc<RwLock<Request>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Pnp(PnpMinorFunction),
    Power(PowerRequest),
    Create,
    Close,
    Read { offset: u64, len: usize },
    Write { offset: u64, len: usize },
    DeviceControl(u32),
}

#[derive(Debug, Default)]
pub enum RequestInformation {
    #[default]
    None,
    Id(String),
    Ids(Vec<String>),
    Relations(Vec<Arc<DeviceRecord>>),
    Bytes(usize),
}

#[derive(Debug)]
pub struct Request {
    pub id: u64,
    pub kind: RequestKind,
    pub status: DriverStatus,
    pub information: RequestInformation,
    completed: bool,
    locks: Vec<RemoveLockToken>,
    tickets: Vec<FilterTicket>,
    completion: Arc<Event>,
}

impl Request {
    pub fn new(kind: RequestKind) -> Self {
        Self {
            id: NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed),
            kind,
            status: DriverStatus::NotSupported,
            information: RequestInformation::None,
            completed: false,
            locks: Vec::new(),
            tickets: Vec::new(),
            completion: Arc::new(Event::new()),
        }
    }

    pub fn new_pnp(minor: PnpMinorFunction) -> Self {
        Self::new(RequestKind::Pnp(minor))
    }

    pub fn into_handle(self) -> RequestHandle {
        Arc::new(RwLock::new(self))
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    pub fn completion(&self) -> Arc<Event> {
        self.completion.clone()
    }

    /// Remove-lock references this request currently pins.
    pub fn held_locks(&self) -> usize {
        self.locks.len()
    }

    pub(crate) fn hold(&mut self, token: RemoveLockToken) {
        self.locks.push(token);
    }

    pub(crate) fn hold_ticket(&mut self, ticket: FilterTicket) {
        self.tickets.push(ticket);
    }

    /// Gives back the reference this request took on `record`, ahead of completion.
    pub(crate) fn release_lock_for(&mut self, record: &Arc<DeviceRecord>) {
        if let Some(pos) = self
            .locks
            .iter()
            .rposition(|t| Arc::ptr_eq(t.record(), record))
        {
            self.locks.swap_remove(pos);
        }
    }
}

/// Records the final status, drops every reference the request held and signals waiters.
///
/// Only the first call has any effect.
pub fn complete_request(req: &RequestHandle, status: DriverStatus) {
    let (locks, tickets, completion) = {
        let mut r = req.write();
        if r.completed {
            return;
        }
        r.completed = true;
        r.status = status;
        (
            mem::take(&mut r.locks),
            mem::take(&mut r.tickets),
            r.completion.clone(),
        )
    };
    drop(tickets);
    drop(locks);
    completion.set();
}

pub fn wait_for_completion(req: &RequestHandle, platform: &dyn Platform) -> DriverStatus {
    let completion = req.read().completion();
    completion.wait(platform);
    req.read().status
}
