//! Channel registry.
//!
//! Owns the fixed-length channel table built once at startup from the
//! static topology.  Channels are referenced by index only.

use std::sync::Arc;

use heapless::Vec;
use log::info;

use crate::config::{DutyPolicy, TimerConfig};
use crate::engine::Channel;
use crate::error::{Error, Result};
use crate::pins::MAX_CHANNELS;
use crate::ports::{PinId, PinPort};

/// Fixed collection of channels, index = channel number.
pub struct Registry<P: PinPort + 'static> {
    channels: Vec<Channel<P>, MAX_CHANNELS>,
    torn_down: bool,
}

impl<P: PinPort + 'static> Registry<P> {
    /// Build `count` channels, binding channel `i` to `bindings[i]`.
    ///
    /// Fails with [`Error::InvalidTopology`] if `count` is zero, does not
    /// match the binding table, exceeds [`MAX_CHANNELS`], or any binding is
    /// absent, negative, or repeated.
    pub fn create(
        count: usize,
        bindings: &[Option<PinId>],
        pins: Arc<P>,
        timer_config: TimerConfig,
        duty_policy: DutyPolicy,
    ) -> Result<Self> {
        if count == 0 {
            return Err(Error::InvalidTopology("no channels"));
        }
        if count != bindings.len() {
            return Err(Error::InvalidTopology("channel count does not match bindings"));
        }
        if count > MAX_CHANNELS {
            return Err(Error::InvalidTopology("too many channels"));
        }

        let mut channels = Vec::new();
        for (index, binding) in bindings.iter().enumerate() {
            let pin = binding.ok_or(Error::InvalidTopology("absent pin binding"))?;
            if pin < 0 {
                return Err(Error::InvalidTopology("negative pin number"));
            }
            if bindings[..index].contains(&Some(pin)) {
                return Err(Error::InvalidTopology("pin bound to two channels"));
            }
            let channel = Channel::new(index, pin, Arc::clone(&pins), timer_config, duty_policy);
            if channels.push(channel).is_err() {
                return Err(Error::InvalidTopology("too many channels"));
            }
        }

        info!("registry: {} channel(s) created", count);
        Ok(Self {
            channels,
            torn_down: false,
        })
    }

    /// Channel at `index`.
    pub fn get(&self, index: usize) -> Result<&Channel<P>> {
        self.channels.get(index).ok_or(Error::OutOfRange {
            index,
            count: self.channels.len(),
        })
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Channel<P>> {
        self.channels.iter()
    }

    /// Stop every running channel, then release every requested pin.
    ///
    /// Runs at most once; later calls (including the one from `Drop`) do
    /// nothing.
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;

        for channel in &self.channels {
            channel.stop();
        }
        for channel in &self.channels {
            channel.free();
        }
        info!("registry: torn down {} channel(s)", self.channels.len());
    }
}

impl<P: PinPort + 'static> Drop for Registry<P> {
    fn drop(&mut self) {
        self.teardown();
    }
}
