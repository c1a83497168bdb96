//! Typed streams.
//!
//! [`BidiStream`] and [`ServerStream`] wrap a [`StreamHandle`] and move
//! payloads through serde, so callers deal in their own message types
//! instead of raw JSON values. Inbound payloads that do not deserialize into
//! the expected type are logged and skipped.

use crate::error::Result;
use crate::protocol::StreamId;
use crate::reply::Reply;
use crate::stream::StreamHandle;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::marker::PhantomData;
use tracing::warn;

fn on_typed<S, F>(handle: &StreamHandle, mut listener: F)
where
    S: DeserializeOwned + 'static,
    F: FnMut(S) + Send + 'static,
{
    let id = handle.id();
    handle.on_data(move |payload| match S::deserialize(payload) {
        Ok(message) => listener(message),
        Err(e) => warn!("Skipping undecodable message on stream id={}: {}", id, e),
    });
}

/// Bidirectional stream: client messages `C` out, server messages `S` in
pub struct BidiStream<C, S> {
    handle: StreamHandle,
    _types: PhantomData<fn(C) -> S>,
}

impl<C, S> BidiStream<C, S>
where
    C: Serialize,
    S: DeserializeOwned + 'static,
{
    pub fn new(handle: StreamHandle) -> Self {
        Self {
            handle,
            _types: PhantomData,
        }
    }

    pub fn id(&self) -> StreamId {
        self.handle.id()
    }

    /// The untyped handle
    pub fn handle(&self) -> &StreamHandle {
        &self.handle
    }

    pub fn send(&self, message: &C) -> Result<()> {
        self.handle.send(serde_json::to_value(message)?)
    }

    pub fn on_message<F>(&self, listener: F)
    where
        F: FnMut(S) + Send + 'static,
    {
        on_typed(&self.handle, listener);
    }

    pub fn on_completion<F>(&self, listener: F)
    where
        F: FnOnce(Reply) + Send + 'static,
    {
        self.handle.on_completion(listener);
    }

    pub async fn completion(&self) -> Reply {
        self.handle.completion().await
    }

    pub fn complete(&self, end: &Reply) -> Result<()> {
        self.handle.complete(end)
    }
}

/// Server stream: one request out, any number of `S` messages in
pub struct ServerStream<S> {
    handle: StreamHandle,
    _types: PhantomData<fn() -> S>,
}

impl<S> ServerStream<S>
where
    S: DeserializeOwned + 'static,
{
    /// Send `request` on a freshly opened stream
    pub fn start<C: Serialize>(handle: StreamHandle, request: &C) -> Result<Self> {
        handle.send(serde_json::to_value(request)?)?;
        Ok(Self {
            handle,
            _types: PhantomData,
        })
    }

    pub fn id(&self) -> StreamId {
        self.handle.id()
    }

    /// The untyped handle
    pub fn handle(&self) -> &StreamHandle {
        &self.handle
    }

    pub fn on_message<F>(&self, listener: F)
    where
        F: FnMut(S) + Send + 'static,
    {
        on_typed(&self.handle, listener);
    }

    pub fn on_completion<F>(&self, listener: F)
    where
        F: FnOnce(Reply) + Send + 'static,
    {
        self.handle.on_completion(listener);
    }

    pub async fn completion(&self) -> Reply {
        self.handle.completion().await
    }

    pub fn complete(&self, end: &Reply) -> Result<()> {
        self.handle.complete(end)
    }
}
