//! Connection state machine
//!
//! One machine per remote bridge. Every link event goes through
//! [`ConnectionMachine::handle`], which returns the side effects the caller
//! must perform. The machine never talks to the radio itself, so it can be
//! driven by a real transport or by a test.

use uuid::Uuid;

use crate::config::SERVICE_UUID;

/// Life-cycle state of the link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    DiscoveringServices,
    DiscoveringCharacteristics,
    EnablingNotifications,
    Ready,
    /// Torn down after a failure, waiting for the retry timer
    Failing,
    /// Authentication refused by the device; no automatic retry
    Rejected,
}

/// Characteristic handles of the bridge service on the current connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharacteristicHandles<H> {
    pub baud: H,
    pub read: H,
    pub write: H,
}

/// Everything the transport or the user can report about the link
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent<H> {
    /// Construction or explicit reconnect
    ConnectRequested,
    RetryTimerFired,
    LinkEstablished,
    LinkFailed,
    ServiceFound(Uuid),
    ServiceDiscoveryFinished,
    CharacteristicsResolved {
        baud: Option<H>,
        read: Option<H>,
        write: Option<H>,
    },
    NotificationsEnabled,
    NotificationsFailed,
    /// The link is closing or already gone
    LinkClosed,
    AuthenticationRejected,
    /// Value update on a characteristic
    Notification { characteristic: Uuid, value: Vec<u8> },
    /// Value read back from the baud characteristic
    BaudRead(u32),
    /// A fire-and-forget write of this many bytes failed in the transport
    WriteFailed(usize),
}

/// Connection status changes visible to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStatus {
    Connected,
    Disconnected,
    ConnectionFailed,
    Rejected,
}

/// Side effect requested by the machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action<H> {
    Connect,
    DiscoverServices,
    ResolveCharacteristics,
    /// Write the desired baud rate to the device and read it back
    PushBaud(H),
    EnableNotifications(H),
    TearDown,
    ScheduleRetry,
    Report(LinkStatus),
}

/// State machine for one BLE link
#[derive(Debug)]
pub struct ConnectionMachine<H> {
    state: ConnectionState,
    handles: Option<CharacteristicHandles<H>>,
    retry_pending: bool,
}

impl<H: Clone> ConnectionMachine<H> {
    pub fn new() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            handles: None,
            retry_pending: false,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == ConnectionState::Ready
    }

    /// Handles of the current connection, `None` unless the service resolved
    pub fn handles(&self) -> Option<&CharacteristicHandles<H>> {
        self.handles.as_ref()
    }

    pub fn retry_pending(&self) -> bool {
        self.retry_pending
    }

    /// Advance the machine, returning the actions to perform in order
    pub fn handle(&mut self, event: &LinkEvent<H>) -> Vec<Action<H>> {
        use ConnectionState::*;

        let mut actions = Vec::new();
        let from = self.state;

        match (from, event) {
            (Disconnected | Failing | Rejected, LinkEvent::ConnectRequested) => {
                self.start_attempt(&mut actions);
            }
            (_, LinkEvent::RetryTimerFired) => {
                self.retry_pending = false;
                if matches!(from, Disconnected | Failing) {
                    self.start_attempt(&mut actions);
                }
            }

            (Connecting, LinkEvent::LinkEstablished) => {
                self.state = DiscoveringServices;
                actions.push(Action::DiscoverServices);
            }
            (Connecting, LinkEvent::LinkFailed) => {
                self.state = Disconnected;
                self.schedule_retry(&mut actions);
            }

            (DiscoveringServices, LinkEvent::ServiceFound(uuid)) if *uuid == SERVICE_UUID => {
                self.state = DiscoveringCharacteristics;
                actions.push(Action::ResolveCharacteristics);
            }
            (DiscoveringServices, LinkEvent::ServiceDiscoveryFinished) => {
                log::warn!("LINK: bridge service not found");
                self.fail(&mut actions);
            }

            (DiscoveringCharacteristics, LinkEvent::CharacteristicsResolved { baud, read, write }) => {
                match (baud, read, write) {
                    (Some(baud), Some(read), Some(write)) => {
                        self.state = EnablingNotifications;
                        self.handles = Some(CharacteristicHandles {
                            baud: baud.clone(),
                            read: read.clone(),
                            write: write.clone(),
                        });
                        actions.push(Action::PushBaud(baud.clone()));
                        actions.push(Action::EnableNotifications(read.clone()));
                    }
                    _ => {
                        log::warn!("LINK: bridge characteristics missing");
                        self.fail(&mut actions);
                    }
                }
            }

            (EnablingNotifications, LinkEvent::NotificationsEnabled) => {
                self.state = Ready;
                actions.push(Action::Report(LinkStatus::Connected));
            }
            (EnablingNotifications, LinkEvent::NotificationsFailed) => {
                log::warn!("LINK: enabling notifications failed");
                self.fail(&mut actions);
            }

            (Disconnected | Rejected, LinkEvent::LinkClosed) => {}
            // Already torn down and reported
            (Failing, LinkEvent::LinkClosed) => {
                self.state = Disconnected;
                self.schedule_retry(&mut actions);
            }
            (Ready, LinkEvent::LinkClosed) => {
                self.state = Disconnected;
                self.handles = None;
                actions.push(Action::TearDown);
                actions.push(Action::Report(LinkStatus::Disconnected));
                self.schedule_retry(&mut actions);
            }
            (_, LinkEvent::LinkClosed) => {
                self.state = Disconnected;
                self.handles = None;
                actions.push(Action::TearDown);
                actions.push(Action::Report(LinkStatus::ConnectionFailed));
                self.schedule_retry(&mut actions);
            }

            (Rejected, LinkEvent::AuthenticationRejected) => {}
            (_, LinkEvent::AuthenticationRejected) => {
                log::warn!("LINK: authentication rejected, not retrying");
                self.state = Rejected;
                self.handles = None;
                actions.push(Action::TearDown);
                actions.push(Action::Report(LinkStatus::Rejected));
            }

            _ => {}
        }

        if self.state != from {
            log::debug!("LINK: {:?} -> {:?}", from, self.state);
        }
        actions
    }

    fn start_attempt(&mut self, actions: &mut Vec<Action<H>>) {
        self.state = ConnectionState::Connecting;
        self.handles = None;
        actions.push(Action::Connect);
    }

    fn fail(&mut self, actions: &mut Vec<Action<H>>) {
        self.state = ConnectionState::Failing;
        self.handles = None;
        actions.push(Action::TearDown);
        actions.push(Action::Report(LinkStatus::ConnectionFailed));
        self.schedule_retry(actions);
    }

    fn schedule_retry(&mut self, actions: &mut Vec<Action<H>>) {
        if !self.retry_pending {
            self.retry_pending = true;
            actions.push(Action::ScheduleRetry);
        }
    }
}

impl<H: Clone> Default for ConnectionMachine<H> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BAUD_CHAR_UUID, READ_CHAR_UUID};

    type Machine = ConnectionMachine<u16>;

    fn resolved() -> LinkEvent<u16> {
        LinkEvent::CharacteristicsResolved {
            baud: Some(1),
            read: Some(2),
            write: Some(3),
        }
    }

    /// Drive a fresh machine to `Ready`, collecting every action
    fn ready() -> (Machine, Vec<Action<u16>>) {
        let mut machine = Machine::new();
        let mut actions = Vec::new();
        for event in [
            LinkEvent::ConnectRequested,
            LinkEvent::LinkEstablished,
            LinkEvent::ServiceFound(BAUD_CHAR_UUID),
            LinkEvent::ServiceFound(SERVICE_UUID),
            resolved(),
            LinkEvent::NotificationsEnabled,
        ] {
            actions.extend(machine.handle(&event));
        }
        (machine, actions)
    }

    fn count(actions: &[Action<u16>], wanted: &Action<u16>) -> usize {
        actions.iter().filter(|a| *a == wanted).count()
    }

    #[test]
    fn test_happy_path() {
        let (machine, actions) = ready();
        assert_eq!(machine.state(), ConnectionState::Ready);
        assert_eq!(
            actions,
            vec![
                Action::Connect,
                Action::DiscoverServices,
                Action::ResolveCharacteristics,
                Action::PushBaud(1),
                Action::EnableNotifications(2),
                Action::Report(LinkStatus::Connected),
            ]
        );
        assert_eq!(
            machine.handles(),
            Some(&CharacteristicHandles { baud: 1, read: 2, write: 3 })
        );
        assert!(!machine.retry_pending());
    }

    #[test]
    fn test_link_failure_retries_silently() {
        let mut machine = Machine::new();
        machine.handle(&LinkEvent::ConnectRequested);
        let actions = machine.handle(&LinkEvent::LinkFailed);
        assert_eq!(machine.state(), ConnectionState::Disconnected);
        assert_eq!(actions, vec![Action::ScheduleRetry]);

        let actions = machine.handle(&LinkEvent::RetryTimerFired);
        assert_eq!(machine.state(), ConnectionState::Connecting);
        assert_eq!(actions, vec![Action::Connect]);
    }

    #[test]
    fn test_missing_service_fails_once() {
        let mut machine = Machine::new();
        machine.handle(&LinkEvent::ConnectRequested);
        machine.handle(&LinkEvent::LinkEstablished);
        machine.handle(&LinkEvent::ServiceFound(READ_CHAR_UUID));
        let mut actions = machine.handle(&LinkEvent::ServiceDiscoveryFinished);
        assert_eq!(machine.state(), ConnectionState::Failing);

        // Teardown closes the link
        actions.extend(machine.handle(&LinkEvent::LinkClosed));
        assert_eq!(machine.state(), ConnectionState::Disconnected);
        assert_eq!(
            actions,
            vec![
                Action::TearDown,
                Action::Report(LinkStatus::ConnectionFailed),
                Action::ScheduleRetry,
            ]
        );
    }

    #[test]
    fn test_every_failure_point_yields_one_retry() {
        let prefixes: Vec<Vec<LinkEvent<u16>>> = vec![
            vec![LinkEvent::ConnectRequested],
            vec![LinkEvent::ConnectRequested, LinkEvent::LinkEstablished],
            vec![
                LinkEvent::ConnectRequested,
                LinkEvent::LinkEstablished,
                LinkEvent::ServiceFound(SERVICE_UUID),
            ],
            vec![
                LinkEvent::ConnectRequested,
                LinkEvent::LinkEstablished,
                LinkEvent::ServiceFound(SERVICE_UUID),
                resolved(),
            ],
        ];
        let failures: Vec<LinkEvent<u16>> = vec![
            LinkEvent::LinkFailed,
            LinkEvent::ServiceDiscoveryFinished,
            LinkEvent::CharacteristicsResolved {
                baud: Some(1),
                read: None,
                write: Some(3),
            },
            LinkEvent::NotificationsFailed,
        ];

        for (prefix, failure) in prefixes.into_iter().zip(failures) {
            let mut machine = Machine::new();
            let mut actions = Vec::new();
            for event in &prefix {
                actions.extend(machine.handle(event));
            }
            actions.extend(machine.handle(&failure));
            actions.extend(machine.handle(&LinkEvent::LinkClosed));

            assert_eq!(machine.state(), ConnectionState::Disconnected, "{:?}", failure);
            assert_eq!(count(&actions, &Action::ScheduleRetry), 1, "{:?}", failure);
            assert_eq!(count(&actions, &Action::Report(LinkStatus::Connected)), 0);
            assert!(machine.handles().is_none());
        }
    }

    #[test]
    fn test_disconnect_from_ready() {
        let (mut machine, _) = ready();
        let actions = machine.handle(&LinkEvent::LinkClosed);
        assert_eq!(machine.state(), ConnectionState::Disconnected);
        assert_eq!(
            actions,
            vec![
                Action::TearDown,
                Action::Report(LinkStatus::Disconnected),
                Action::ScheduleRetry,
            ]
        );
        assert!(machine.handles().is_none());

        // The transport reports its own teardown as another close
        assert!(machine.handle(&LinkEvent::LinkClosed).is_empty());

        // Reconnect on timer
        assert_eq!(machine.handle(&LinkEvent::RetryTimerFired), vec![Action::Connect]);
    }

    #[test]
    fn test_single_retry_timer_outstanding() {
        let mut machine = Machine::new();
        machine.handle(&LinkEvent::ConnectRequested);
        machine.handle(&LinkEvent::LinkEstablished);
        let first = machine.handle(&LinkEvent::ServiceDiscoveryFinished);
        assert_eq!(count(&first, &Action::ScheduleRetry), 1);

        // Stray closes while the timer is pending schedule nothing new
        assert!(machine.handle(&LinkEvent::LinkClosed).is_empty());
        assert!(machine.handle(&LinkEvent::LinkClosed).is_empty());
        assert!(machine.retry_pending());
    }

    #[test]
    fn test_retry_in_failing_reconnects() {
        let mut machine = Machine::new();
        machine.handle(&LinkEvent::ConnectRequested);
        machine.handle(&LinkEvent::LinkEstablished);
        machine.handle(&LinkEvent::ServiceDiscoveryFinished);
        assert_eq!(machine.state(), ConnectionState::Failing);

        assert_eq!(machine.handle(&LinkEvent::RetryTimerFired), vec![Action::Connect]);
        assert_eq!(machine.state(), ConnectionState::Connecting);
        assert!(!machine.retry_pending());
    }

    #[test]
    fn test_stale_timer_only_clears_flag() {
        let mut machine = Machine::new();
        machine.handle(&LinkEvent::ConnectRequested);
        machine.handle(&LinkEvent::LinkFailed);
        assert!(machine.retry_pending());

        // A manual reconnect overtakes the timer
        machine.handle(&LinkEvent::ConnectRequested);
        assert_eq!(machine.state(), ConnectionState::Connecting);

        assert!(machine.handle(&LinkEvent::RetryTimerFired).is_empty());
        assert_eq!(machine.state(), ConnectionState::Connecting);
        assert!(!machine.retry_pending());
    }

    #[test]
    fn test_close_before_ready_reports_failure() {
        let mut machine = Machine::new();
        machine.handle(&LinkEvent::ConnectRequested);
        let actions = machine.handle(&LinkEvent::LinkClosed);
        assert_eq!(machine.state(), ConnectionState::Disconnected);
        assert_eq!(
            actions,
            vec![
                Action::TearDown,
                Action::Report(LinkStatus::ConnectionFailed),
                Action::ScheduleRetry,
            ]
        );
    }

    #[test]
    fn test_close_during_discovery_tears_down_once() {
        let mut machine = Machine::new();
        machine.handle(&LinkEvent::ConnectRequested);
        machine.handle(&LinkEvent::LinkEstablished);
        let mut actions = machine.handle(&LinkEvent::LinkClosed);
        actions.extend(machine.handle(&LinkEvent::LinkClosed));

        assert_eq!(machine.state(), ConnectionState::Disconnected);
        assert_eq!(count(&actions, &Action::TearDown), 1);
        assert_eq!(count(&actions, &Action::Report(LinkStatus::ConnectionFailed)), 1);
        assert_eq!(count(&actions, &Action::ScheduleRetry), 1);
    }

    #[test]
    fn test_authentication_rejected_is_terminal() {
        let mut machine = Machine::new();
        machine.handle(&LinkEvent::ConnectRequested);
        machine.handle(&LinkEvent::LinkEstablished);
        let actions = machine.handle(&LinkEvent::AuthenticationRejected);
        assert_eq!(machine.state(), ConnectionState::Rejected);
        assert_eq!(
            actions,
            vec![Action::TearDown, Action::Report(LinkStatus::Rejected)]
        );

        assert!(machine.handle(&LinkEvent::LinkClosed).is_empty());
        assert!(machine.handle(&LinkEvent::RetryTimerFired).is_empty());
        assert_eq!(machine.state(), ConnectionState::Rejected);

        assert_eq!(machine.handle(&LinkEvent::ConnectRequested), vec![Action::Connect]);
    }

    #[test]
    fn test_out_of_state_events_ignored() {
        let (mut machine, _) = ready();
        assert!(machine.handle(&LinkEvent::LinkEstablished).is_empty());
        assert!(machine.handle(&LinkEvent::ServiceDiscoveryFinished).is_empty());
        assert!(machine.handle(&LinkEvent::ConnectRequested).is_empty());
        assert!(machine.handle(&LinkEvent::BaudRead(9600)).is_empty());
        assert_eq!(machine.state(), ConnectionState::Ready);
    }
}
