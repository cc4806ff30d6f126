//! The motion sequencer.
//!
//! The board executes a queue of timed cues over a set of channels fixed
//! at open time. The host tracks available cue slots from the board's
//! events: OPENED and STOPPED report the absolute count, NEXT_CUE frees
//! one slot. `push` blocks while the queue is full.

use std::collections::VecDeque;
use std::sync::Arc;

use ioio_protocol as proto;
use proto::SequencerEventKind;

use super::{Lifecycle, Monitor};
use crate::error::{Error, Result};
use crate::link::{Listener, Notice, Update};
use crate::resource::{Request, ResourceId, ResourceKind};
use crate::session::Core;

/// Event backlog kept for [`Sequencer::wait_event`].
const EVENT_BACKLOG: usize = 64;

#[derive(Default)]
struct SeqData {
    /// None until the board confirms the open.
    slots: Option<u8>,
    events: VecDeque<SequencerEventKind>,
}

struct SequencerState {
    inner: Monitor<SeqData>,
}

impl Listener for SequencerState {
    fn update(&self, update: Update<'_>) {
        if let Update::Sequencer { kind, slots } = update {
            self.inner.update(|data| {
                match kind {
                    SequencerEventKind::Opened | SequencerEventKind::Stopped => {
                        data.slots = Some(slots);
                    }
                    SequencerEventKind::NextCue => {
                        if let Some(slots) = data.slots.as_mut() {
                            *slots = slots.saturating_add(1);
                        }
                    }
                    SequencerEventKind::Paused
                    | SequencerEventKind::Stalled
                    | SequencerEventKind::Closed => {}
                }
                if data.events.len() == EVENT_BACKLOG {
                    data.events.pop_front();
                }
                data.events.push_back(kind);
            });
        }
    }

    fn notice(&self, notice: Notice) {
        self.inner.terminate(Lifecycle::from_notice(notice));
    }
}

pub struct Sequencer {
    core: Arc<Core>,
    state: Arc<SequencerState>,
    key: ResourceId,
    cue_size: usize,
}

impl Sequencer {
    pub(crate) fn open(core: Arc<Core>, config: &[u8]) -> Result<Self> {
        core.caps()?;
        if config.is_empty() || config.len() > proto::MAX_SEQUENCER_BLOCK {
            return Err(Error::IllegalArgument(format!(
                "channel config must be 1..={} bytes",
                proto::MAX_SEQUENCER_BLOCK
            )));
        }
        let key = core.resources.alloc(&[Request::Pooled(ResourceKind::Sequencer)])?[0];
        let state = Arc::new(SequencerState {
            inner: Monitor::new(SeqData::default()),
        });
        core.bus.register(key, state.clone());

        let sent = core
            .outgoing
            .send_with(|out| proto::encode_sequencer_configure(config, out));
        if let Err(err) = sent {
            core.bus.unregister(key);
            core.resources.free(key);
            return Err(err);
        }
        Ok(Self {
            core,
            state,
            key,
            cue_size: config.len(),
        })
    }

    /// Appends a cue to be held for `duration_ticks` of the 62.5 kHz
    /// sequencer clock. Blocks while the board-side cue queue is full.
    pub fn push(&self, cue: &[u8], duration_ticks: u16) -> Result<()> {
        self.check_cue(cue)?;
        self.state.inner.wait_for(|data| match data.slots.as_mut() {
            Some(slots) if *slots > 0 => {
                *slots -= 1;
                Some(())
            }
            _ => None,
        })?;
        self.core
            .outgoing
            .send_with(|out| proto::encode_sequencer_push(duration_ticks, cue, out))
    }

    pub fn start(&self) -> Result<()> {
        self.state.inner.check_open()?;
        self.core.outgoing.send_with(proto::encode_sequencer_start)
    }

    pub fn pause(&self) -> Result<()> {
        self.state.inner.check_open()?;
        self.core.outgoing.send_with(proto::encode_sequencer_pause)
    }

    pub fn stop(&self) -> Result<()> {
        self.state.inner.check_open()?;
        self.core.outgoing.send_with(proto::encode_sequencer_stop)
    }

    /// Drives the channels with `cue` immediately, bypassing the queue.
    pub fn manual_start(&self, cue: &[u8]) -> Result<()> {
        self.check_cue(cue)?;
        self.state.inner.check_open()?;
        self.core
            .outgoing
            .send_with(|out| proto::encode_sequencer_manual_start(cue, out))
    }

    pub fn manual_stop(&self) -> Result<()> {
        self.state.inner.check_open()?;
        self.core
            .outgoing
            .send_with(proto::encode_sequencer_manual_stop)
    }

    /// Next sequencer event, in arrival order.
    pub fn wait_event(&self) -> Result<SequencerEventKind> {
        self.state.inner.wait_for(|data| data.events.pop_front())
    }

    /// Cancels blocked `push`/`wait_event` calls.
    pub fn interrupt(&self) {
        self.state.inner.interrupt();
    }

    fn check_cue(&self, cue: &[u8]) -> Result<()> {
        if cue.len() != self.cue_size {
            return Err(Error::IllegalArgument(format!(
                "cue must be {} bytes to match the channel config",
                self.cue_size
            )));
        }
        Ok(())
    }

    pub fn close(self) -> Result<()> {
        self.close_inner()
    }

    fn close_inner(&self) -> Result<()> {
        if !self.state.inner.begin_close() {
            return Ok(());
        }
        self.core.bus.unregister(self.key);
        let result = self
            .core
            .outgoing
            .send_with(|out| proto::encode_sequencer_configure(&[], out));
        self.core.resources.free(self.key);
        result
    }
}

impl Drop for Sequencer {
    fn drop(&mut self) {
        let _ = self.close_inner();
    }
}
