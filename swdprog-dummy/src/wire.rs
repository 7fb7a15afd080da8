// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! Target side of the SWD wire
//!
//! [`Link`] is clocked once per rising SWCLK edge with whatever the host is
//! driving on SWDIO (or `None` if the host has released it).  It decodes
//! request headers, drives ACK and read data back, and collects write data.
//! Everything above the wire is left to the caller through [`LinkEvent`].

#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

/// Consecutive host 1s that make a line reset.
pub(crate) const LINE_RESET_BITS: u32 = 50;

pub(crate) const ACK_OK: u8 = 0b001;

/// A decoded request header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Request {
    pub ap: bool,
    pub read: bool,
    /// A[3:2], as a byte address (0x0, 0x4, 0x8 or 0xC)
    pub addr: u8,
}

impl Request {
    // Header bits, LSB first: start, APnDP, RnW, A2, A3, parity, stop, park.
    fn decode(header: u8) -> Option<Self> {
        let start = header & 0x01 != 0;
        let stop = header & 0x40 != 0;
        let park = header & 0x80 != 0;
        let payload = (header >> 1) & 0x0F;
        let parity = header & 0x20 != 0;

        if !start || stop || !park || (payload.count_ones() % 2 == 1) != parity {
            return None;
        }

        Some(Self {
            ap: payload & 0x01 != 0,
            read: payload & 0x02 != 0,
            addr: payload & 0x0C,
        })
    }
}

/// Something the layer above the wire has to act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LinkEvent {
    /// 50 or more 1s were clocked in.
    LineReset,

    /// A valid header arrived.  [`Link::respond()`] must be called before
    /// the next edge.
    Request(Request),

    /// Write data and parity arrived after an OK write.
    Write {
        request: Request,
        data: u32,
        parity_ok: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    // Protocol error or power on.  Only a line reset gets out of here.
    Lockout,
    Reset,
    Idle,
    Header { bits: u8, count: u8 },
    AwaitResponse(Request),
    Turnaround { request: Request, ack: u8, data: u64 },
    Ack { request: Request, ack: u8, data: u64, index: u8 },
    WriteTurnaround(Request),
    WriteData { request: Request, data: u64, index: u8 },
    ReadData { data: u64, index: u8 },
}

#[derive(Debug, Clone)]
pub(crate) struct Link {
    state: State,
    ones: u32,
    output: Option<bool>,
}

impl Default for Link {
    fn default() -> Self {
        Self {
            state: State::Lockout,
            ones: 0,
            output: None,
        }
    }
}

impl Link {
    /// The level the target is driving on SWDIO, if any.
    pub fn output(&self) -> Option<bool> {
        self.output
    }

    /// Whether the link is waiting for a line reset.
    #[cfg(test)]
    pub fn locked_out(&self) -> bool {
        self.state == State::Lockout
    }

    /// Supplies the response to the last [`LinkEvent::Request`].  `data` is
    /// only used for OK reads, and `parity` is the parity bit sent with it.
    pub fn respond(&mut self, request: Request, ack: u8, data: u32, parity: bool) {
        debug_assert_eq!(self.state, State::AwaitResponse(request));
        let data = data as u64 | ((parity as u64) << 32);
        self.state = State::Turnaround { request, ack, data };
    }

    /// Processes one rising SWCLK edge.  `host` is the level the host is
    /// driving on SWDIO, or `None` if it isn't driving.
    pub fn clock(&mut self, host: Option<bool>) -> Option<LinkEvent> {
        if host == Some(true) {
            self.ones += 1;
        } else {
            self.ones = 0;
        }

        if self.ones >= LINE_RESET_BITS {
            if self.state != State::Reset {
                trace!("Line reset");
                self.state = State::Reset;
                self.output = None;
                return Some(LinkEvent::LineReset);
            }
            return None;
        }

        let (next, event) = self.step(host);
        self.state = next;
        event
    }

    fn step(&mut self, host: Option<bool>) -> (State, Option<LinkEvent>) {
        match self.state {
            State::Lockout => (State::Lockout, None),
            State::Reset => match host {
                Some(false) => (State::Idle, None),
                _ => (State::Reset, None),
            },
            State::Idle => match host {
                Some(true) => (State::Header { bits: 1, count: 1 }, None),
                _ => (State::Idle, None),
            },
            State::Header { bits, count } => {
                let Some(bit) = host else {
                    debug!("Host released SWDIO mid-header");
                    return (State::Lockout, None);
                };
                let bits = bits | ((bit as u8) << count);
                let count = count + 1;
                if count < 8 {
                    return (State::Header { bits, count }, None);
                }
                match Request::decode(bits) {
                    Some(request) => (
                        State::AwaitResponse(request),
                        Some(LinkEvent::Request(request)),
                    ),
                    None => {
                        debug!("Invalid header 0x{bits:02X}, waiting for line reset");
                        (State::Lockout, None)
                    }
                }
            }
            State::AwaitResponse(_) => {
                warn!("Clocked without a response to the request");
                (State::Lockout, None)
            }
            State::Turnaround { request, ack, data } => {
                self.output = Some(ack & 0x01 != 0);
                (
                    State::Ack {
                        request,
                        ack,
                        data,
                        index: 0,
                    },
                    None,
                )
            }
            State::Ack {
                request,
                ack,
                data,
                index,
            } => {
                let index = index + 1;
                if index < 3 {
                    self.output = Some(ack & (1 << index) != 0);
                    return (
                        State::Ack {
                            request,
                            ack,
                            data,
                            index,
                        },
                        None,
                    );
                }

                if ack != ACK_OK {
                    self.output = None;
                    return (State::Idle, None);
                }

                if request.read {
                    self.output = Some(data & 0x01 != 0);
                    (State::ReadData { data, index: 0 }, None)
                } else {
                    self.output = None;
                    (State::WriteTurnaround(request), None)
                }
            }
            State::WriteTurnaround(request) => (
                State::WriteData {
                    request,
                    data: 0,
                    index: 0,
                },
                None,
            ),
            State::WriteData {
                request,
                data,
                index,
            } => {
                let Some(bit) = host else {
                    debug!("Host released SWDIO during write data");
                    return (State::Lockout, None);
                };
                let data = data | ((bit as u64) << index);
                let index = index + 1;
                if index < 33 {
                    return (
                        State::WriteData {
                            request,
                            data,
                            index,
                        },
                        None,
                    );
                }

                let value = data as u32;
                let parity = data & (1 << 32) != 0;
                let event = LinkEvent::Write {
                    request,
                    data: value,
                    parity_ok: (value.count_ones() % 2 == 1) == parity,
                };
                (State::Idle, Some(event))
            }
            State::ReadData { data, index } => {
                let index = index + 1;
                if index < 33 {
                    self.output = Some(data & (1 << index) != 0);
                    (State::ReadData { data, index }, None)
                } else {
                    self.output = None;
                    (State::Idle, None)
                }
            }
        }
    }
}
