//! PHY link monitoring
//!
//! Periodically reads the PHY status register and reports up/down
//! transitions to the main scheduling loop. The server logic does not
//! consume link events; it simply stops seeing connections when the link is
//! gone.

use crate::registers::Registers;
use std::time::{Duration, Instant};

/// A link state transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEvent {
    Up,
    Down,
}

/// Rate-limited PHY status poller
pub struct LinkMonitor {
    interval: Duration,
    last_poll: Option<Instant>,
    link_up: Option<bool>,
}

impl LinkMonitor {
    pub fn new(interval: Duration) -> Self {
        LinkMonitor {
            interval,
            last_poll: None,
            link_up: None,
        }
    }

    /// Last observed link state, if any poll has completed
    pub fn is_up(&self) -> Option<bool> {
        self.link_up
    }

    /// Poll the PHY; returns a transition event when the state changed
    ///
    /// The first successful poll reports the initial state as a transition.
    /// Read failures are logged and leave the cached state untouched.
    pub fn poll(&mut self, regs: &mut Registers) -> Option<LinkEvent> {
        if let Some(last) = self.last_poll {
            if last.elapsed() < self.interval {
                return None;
            }
        }
        self.last_poll = Some(Instant::now());

        let up = match regs.link_up() {
            Ok(up) => up,
            Err(e) => {
                log::warn!("PHY status read failed: {}", e);
                return None;
            }
        };

        let changed = self.link_up != Some(up);
        self.link_up = Some(up);
        if !changed {
            return None;
        }

        if up {
            log::info!("Link up");
            Some(LinkEvent::Up)
        } else {
            log::warn!("Link down");
            Some(LinkEvent::Down)
        }
    }
}

/// Block until the PHY reports link up or the timeout passes
pub fn wait_for_link(regs: &mut Registers, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        match regs.link_up() {
            Ok(true) => return true,
            Ok(false) => {}
            Err(e) => log::warn!("PHY status read failed: {}", e),
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(50));
    }
}
