//! # Job codec.
//!
//! Turns a [`JobRequest`] into the bytes and headers of a job message, and a received body back
//! into a [`DecodedJob`].
//!
//! - positional and keyword arguments are JSON encoded into separate blobs
//! - a blob larger than the compression threshold is zlib compressed
//! - the encoded message as a whole must not exceed the payload ceiling
use std::io::{Read, Write};

use farm_model::{ContextSnapshot, JobMessage, RawTimeoutHeaders};
use flate2::{Compression, read::ZlibDecoder, write::ZlibEncoder};
use serde_json::{Map, Value};

use crate::{
    CoreError, FarmConfig,
    registry::{reference_of, validate_reference},
};

/// Job as requested by a publisher.
#[derive(Clone, Debug, PartialEq)]
pub struct JobRequest {
    callable_reference: String,
    args: Vec<Value>,
    kwargs: Map<String, Value>,
    context: ContextSnapshot,
    soft_timeout_s: Option<u64>,
    hard_timeout_s: Option<u64>,
}

impl JobRequest {
    /// Job calling the callable registered under `reference`.
    pub fn new(reference: impl Into<String>) -> Self {
        Self {
            callable_reference: reference.into(),
            args: Vec::new(),
            kwargs: Map::new(),
            context: ContextSnapshot::default(),
            soft_timeout_s: None,
            hard_timeout_s: None,
        }
    }

    /// Job calling the function item `f`, referenced by its type path.
    pub fn for_fn<F>(f: &F) -> Result<Self, CoreError> {
        Ok(Self::new(reference_of(f)?))
    }

    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.args.push(value.into());
        self
    }

    pub fn args(mut self, values: impl IntoIterator<Item = Value>) -> Self {
        self.args.extend(values);
        self
    }

    pub fn kwarg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.kwargs.insert(name.into(), value.into());
        self
    }

    pub fn context(mut self, context: ContextSnapshot) -> Self {
        self.context = context;
        self
    }

    /// Per-message soft timeout override (`0` disables the soft watchdog).
    pub fn soft_timeout_s(mut self, secs: u64) -> Self {
        self.soft_timeout_s = Some(secs);
        self
    }

    /// Per-message hard timeout override.
    pub fn hard_timeout_s(mut self, secs: u64) -> Self {
        self.hard_timeout_s = Some(secs);
        self
    }

    #[inline]
    pub fn callable_reference(&self) -> &str {
        &self.callable_reference
    }

    #[inline]
    pub fn timeout_headers(&self) -> RawTimeoutHeaders {
        RawTimeoutHeaders::new(self.soft_timeout_s, self.hard_timeout_s)
    }
}

/// Encoded job, ready for publishing.
#[derive(Clone, Debug)]
pub struct EncodedJob {
    pub callable_reference: String,
    pub body: Vec<u8>,
    pub headers: RawTimeoutHeaders,
}

/// Job as reconstructed by a worker.
#[derive(Clone, Debug, PartialEq)]
pub struct DecodedJob {
    pub callable_reference: String,
    pub args: Vec<Value>,
    pub kwargs: Map<String, Value>,
    pub context: ContextSnapshot,
}

#[derive(Clone, Copy, Debug)]
pub struct JobCodec {
    compress_threshold: usize,
    max_payload: usize,
}

impl JobCodec {
    pub fn new(compress_threshold: usize, max_payload: usize) -> Self {
        Self {
            compress_threshold,
            max_payload,
        }
    }

    pub fn from_config(cfg: &FarmConfig) -> Self {
        Self::new(cfg.compress_threshold_bytes, cfg.max_payload_bytes)
    }

    #[inline]
    pub fn max_payload(&self) -> usize {
        self.max_payload
    }

    /// Encodes `req`; fails on an unusable reference or an oversized message.
    pub fn encode(&self, req: &JobRequest) -> Result<EncodedJob, CoreError> {
        validate_reference(&req.callable_reference)?;

        let (args_blob, args_compressed) = self.pack(&serde_json::to_vec(&req.args)?)?;
        let (kwargs_blob, kwargs_compressed) = self.pack(&serde_json::to_vec(&req.kwargs)?)?;

        let body = JobMessage {
            callable_reference: req.callable_reference.clone(),
            args_blob,
            kwargs_blob,
            args_compressed,
            kwargs_compressed,
            context_snapshot: req.context.clone(),
        }
        .to_bytes()?;

        if body.len() > self.max_payload {
            return Err(CoreError::PayloadTooLarge {
                size: body.len(),
                limit: self.max_payload,
            });
        }

        Ok(EncodedJob {
            callable_reference: req.callable_reference.clone(),
            body,
            headers: req.timeout_headers(),
        })
    }

    /// Decodes a message body.
    pub fn decode(&self, body: &[u8]) -> Result<DecodedJob, CoreError> {
        let msg = JobMessage::from_bytes(body)?;

        let args: Vec<Value> = match msg.args_blob.is_empty() {
            true => Vec::new(),
            false => serde_json::from_slice(&unpack(&msg.args_blob, msg.args_compressed)?)?,
        };
        let kwargs: Map<String, Value> = match msg.kwargs_blob.is_empty() {
            true => Map::new(),
            false => serde_json::from_slice(&unpack(&msg.kwargs_blob, msg.kwargs_compressed)?)?,
        };

        Ok(DecodedJob {
            callable_reference: msg.callable_reference,
            args,
            kwargs,
            context: msg.context_snapshot,
        })
    }

    fn pack(&self, raw: &[u8]) -> Result<(Vec<u8>, bool), CoreError> {
        if raw.len() <= self.compress_threshold {
            return Ok((raw.to_vec(), false));
        }
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(raw)?;
        Ok((encoder.finish()?, true))
    }
}

fn unpack(blob: &[u8], compressed: bool) -> Result<Vec<u8>, CoreError> {
    if !compressed {
        return Ok(blob.to_vec());
    }
    let mut out = Vec::new();
    ZlibDecoder::new(blob).read_to_end(&mut out)?;
    Ok(out)
}
