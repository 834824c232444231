/// Health of the link to the relay and, through it, to the rover.
///
/// The device flag only exists while the transport is connected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkState {
    #[default]
    Disconnected,
    Connecting,
    Connected {
        device: bool,
    },
}

impl LinkState {
    pub fn transport_connected(self) -> bool {
        matches!(self, LinkState::Connected { .. })
    }

    pub fn device_connected(self) -> bool {
        matches!(self, LinkState::Connected { device: true })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_implies_transport() {
        for state in [
            LinkState::Disconnected,
            LinkState::Connecting,
            LinkState::Connected { device: false },
            LinkState::Connected { device: true },
        ] {
            if state.device_connected() {
                assert!(state.transport_connected());
            }
        }
    }
}
