#![allow(dead_code)]

use bytes::{Bytes, BytesMut};
use dtouch_driver::{
    protocol::{
        frame::DTouchCodecContext, Command, DTouchSession, DTouchSessionImpl, RequestFrame,
        ResponseFrame,
    },
    ChannelConfig, DeviceConfig,
};
use dtouch_sdk::{PublishResult, PublishedValue, Publisher, WireDecode, WireEncode};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, Once},
    time::Duration,
};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    task::JoinHandle,
};
use tracing::Level;

static INIT_TRACING: Once = Once::new();

pub fn init_tracing() {
    INIT_TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(Level::DEBUG)
            .with_target(false)
            .without_time()
            .try_init();
    });
}

/// Publisher that keeps everything it is handed.
#[derive(Debug, Default)]
pub struct CollectingPublisher {
    values: Mutex<Vec<Arc<PublishedValue>>>,
}

impl CollectingPublisher {
    pub fn take(&self) -> Vec<Arc<PublishedValue>> {
        std::mem::take(&mut *self.values.lock().unwrap())
    }

    pub fn len(&self) -> usize {
        self.values.lock().unwrap().len()
    }
}

impl Publisher for CollectingPublisher {
    fn try_publish(&self, value: Arc<PublishedValue>) -> PublishResult<()> {
        self.values.lock().unwrap().push(value);
        Ok(())
    }
}

/// How the simulated controller answers one command.
#[derive(Debug, Clone)]
pub enum Behavior {
    Reply(Vec<u8>),
    /// Never answer.
    Silent,
    /// Answer with one payload bit flipped after the checksum was computed.
    Corrupt(Vec<u8>),
    /// Send only the first `n` bytes of the reply.
    Partial(Vec<u8>, usize),
    /// Answer after `delay`.
    Delayed(Vec<u8>, Duration),
    /// Drop the link.
    Hangup,
}

/// Per-command behaviour, editable while the simulator runs.
#[derive(Debug, Clone, Default)]
pub struct Script(Arc<Mutex<HashMap<Command, Behavior>>>);

impl Script {
    pub fn set(&self, command: Command, behavior: Behavior) -> &Self {
        self.0.lock().unwrap().insert(command, behavior);
        self
    }

    fn get(&self, command: Command) -> Behavior {
        self.0
            .lock()
            .unwrap()
            .get(&command)
            .cloned()
            .unwrap_or(Behavior::Silent)
    }
}

pub fn response(address: u8, payload: &[u8]) -> Vec<u8> {
    let mut buf = BytesMut::new();
    ResponseFrame::new(address, payload.to_vec())
        .encode_to(&mut buf, &DTouchCodecContext::default())
        .unwrap();
    buf.to_vec()
}

/// `[total][n][probe; n]` page payload.
pub fn measurement(total: u16, probes: &[u16]) -> Vec<u8> {
    let mut payload = total.to_be_bytes().to_vec();
    payload.push(probes.len() as u8);
    for p in probes {
        payload.extend_from_slice(&p.to_be_bytes());
    }
    payload
}

/// Control-values payload: temperature ideal/final, EMC ideal/final, MC final,
/// then heating, fans, flaps and sprayer levels.
pub fn control_values(words: [u16; 5], levels: [u8; 4]) -> Vec<u8> {
    let mut payload = Vec::with_capacity(16);
    for w in words {
        payload.extend_from_slice(&w.to_be_bytes());
    }
    payload.extend_from_slice(&[0x00, 0x00]);
    payload.extend_from_slice(&levels);
    payload
}

/// Answer requests on `device` according to `script` until the link closes.
pub async fn serve<S>(mut device: S, address: u8, script: Script)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let ctx = DTouchCodecContext::default().with_address(address);
    loop {
        let mut req = [0u8; RequestFrame::LEN];
        if device.read_exact(&mut req).await.is_err() {
            break;
        }
        let (_, frame) = RequestFrame::parse(&req, &Bytes::new(), &ctx)
            .expect("simulator received an invalid request");

        let bytes = match script.get(frame.command) {
            Behavior::Reply(payload) => response(address, &payload),
            Behavior::Silent => continue,
            Behavior::Corrupt(payload) => {
                let mut bytes = response(address, &payload);
                bytes[6] ^= 0x01;
                bytes
            }
            Behavior::Partial(payload, n) => response(address, &payload)[..n].to_vec(),
            Behavior::Delayed(payload, delay) => {
                tokio::time::sleep(delay).await;
                response(address, &payload)
            }
            Behavior::Hangup => break,
        };
        if device.write_all(&bytes).await.is_err() {
            break;
        }
    }
}

/// Scripted controller on the far side of an in-memory link.
pub fn spawn_simulator(address: u8, script: Script) -> (Arc<dyn DTouchSession>, JoinHandle<()>) {
    let (client, device) = tokio::io::duplex(1024);
    let handle = tokio::spawn(serve(device, address, script));
    (Arc::new(DTouchSessionImpl::new(client, address)), handle)
}

pub fn channel(num_probes: u32) -> Option<ChannelConfig> {
    Some(ChannelConfig {
        num_probes,
        ..Default::default()
    })
}

pub fn device_config() -> DeviceConfig {
    DeviceConfig {
        address: 0x01,
        update_interval_ms: 5_000,
        ..Default::default()
    }
}

pub fn names(values: &[Arc<PublishedValue>]) -> Vec<&str> {
    values.iter().map(|v| &*v.entity).collect()
}
