//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::cmp;
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::{sleep, timeout};
use tracing::debug;
use vxplane_utils::worker::Worker;
use vxplane_utils::{Receiver, Sender};

use crate::api::{
    GlobalInfo, Path, SpeakerRpcRef, Table, VrfMsg, WatchEvent,
};
use crate::error::Error;

// Deadline for connection-establishment calls (readiness probing).
const CONNECT_TIMEOUT: Duration = Duration::from_secs(1);
// Deadline for path and VRF mutations.
const RPC_TIMEOUT: Duration = Duration::from_secs(3);
// Reconnect backoff bounds.
const BACKOFF_MIN: Duration = Duration::from_secs(1);
const BACKOFF_MAX: Duration = Duration::from_secs(30);
// Per-subscriber watch queue depth.
const WATCH_QUEUE_DEPTH: usize = 16;

// Shared handle to the external BGP speaker.
//
// Clones share the underlying transport; the supervisor owns the watch task
// and outlives every other holder.
#[derive(Clone)]
pub struct SpeakerClient {
    rpc: SpeakerRpcRef,
    subscribers: Arc<Mutex<Vec<Sender<WatchEvent>>>>,
    closed_tx: Arc<watch::Sender<bool>>,
}

// ===== impl SpeakerClient =====

impl SpeakerClient {
    pub fn new(rpc: SpeakerRpcRef) -> SpeakerClient {
        let (closed_tx, _closed_rx) = watch::channel(false);
        SpeakerClient {
            rpc,
            subscribers: Arc::new(Mutex::new(Vec::new())),
            closed_tx: Arc::new(closed_tx),
        }
    }

    // Blocks until the speaker is reachable and reports a usable global
    // configuration (nonzero router-ID and AS number), backing off
    // exponentially between attempts.
    pub async fn wait_ready(&self) -> GlobalInfo {
        let mut delay = BACKOFF_MIN;
        loop {
            match timeout(CONNECT_TIMEOUT, self.rpc.get_global()).await {
                Ok(Ok(global))
                    if global.router_id != Ipv4Addr::UNSPECIFIED
                        && global.local_as != 0 =>
                {
                    return global;
                }
                Ok(Ok(_)) => {
                    debug!("speaker is not configured yet, waiting");
                }
                Ok(Err(error)) => {
                    error.log();
                }
                Err(_) => {
                    debug!("speaker connection attempt timed out");
                }
            }
            sleep(delay).await;
            delay = cmp::min(delay * 2, BACKOFF_MAX);
        }
    }

    // Registers a new watch subscriber. Events are delivered in the order
    // received from the speaker; a slow subscriber backpressures the fan-out
    // rather than losing events.
    pub fn subscribe(&self) -> Receiver<WatchEvent> {
        let (event_tx, event_rx) = mpsc::channel(WATCH_QUEUE_DEPTH);
        self.subscribers.lock().unwrap().push(event_tx);
        event_rx
    }

    // Spawns the watch loop: reads events from the speaker and fans them
    // out, reissuing the watch after a disconnect. Events that occurred
    // while disconnected are lost; consumers reconcile from the new stream.
    pub fn start_watch(&self) -> Worker<()> {
        let client = self.clone();
        Worker::spawn(async move {
            client.watch_loop().await;
        })
    }

    async fn watch_loop(&self) {
        let mut closed_rx = self.closed_tx.subscribe();
        let mut delay = BACKOFF_MIN;

        loop {
            if *closed_rx.borrow() {
                break;
            }

            match self.rpc.watch().await {
                Ok(mut events) => {
                    delay = BACKOFF_MIN;
                    loop {
                        tokio::select! {
                            event = events.recv() => match event {
                                Some(event) => self.broadcast(event).await,
                                // Stream ended; reissue the watch.
                                None => break,
                            },
                            _ = closed_rx.changed() => break,
                        }
                    }
                }
                Err(error) => error.log(),
            }
            if *closed_rx.borrow() {
                break;
            }

            // Backoff before reissuing the watch.
            tokio::select! {
                _ = sleep(delay) => {}
                _ = closed_rx.changed() => {}
            }
            delay = cmp::min(delay * 2, BACKOFF_MAX);
        }

        self.broadcast(WatchEvent::Closed).await;
    }

    async fn broadcast(&self, event: WatchEvent) {
        let subscribers = self.subscribers.lock().unwrap().clone();
        let mut gone = false;
        for subscriber in subscribers {
            gone |= subscriber.send(event.clone()).await.is_err();
        }
        // Forget subscribers whose receiving end went away.
        if gone {
            self.subscribers
                .lock()
                .unwrap()
                .retain(|subscriber| !subscriber.is_closed());
        }
    }

    // Closes the watch channel. Subscribers observe a final `Closed` event.
    pub fn close(&self) {
        // send_replace works even before the watch loop subscribed.
        self.closed_tx.send_replace(true);
    }

    pub async fn add_path(
        &self,
        table: Table,
        path: Path,
    ) -> Result<(), Error> {
        match timeout(RPC_TIMEOUT, self.rpc.add_path(table, path)).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout("AddPath")),
        }
    }

    pub async fn delete_path(
        &self,
        table: Table,
        path: Path,
    ) -> Result<(), Error> {
        match timeout(RPC_TIMEOUT, self.rpc.delete_path(table, path)).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout("DeletePath")),
        }
    }

    pub async fn add_vrf(&self, vrf: VrfMsg) -> Result<(), Error> {
        match timeout(RPC_TIMEOUT, self.rpc.add_vrf(vrf)).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout("AddVrf")),
        }
    }
}

impl std::fmt::Debug for SpeakerClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpeakerClient").finish_non_exhaustive()
    }
}

// ===== tests =====

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use async_trait::async_trait;

    use super::*;
    use crate::api::SpeakerRpc;

    // Speaker stub delivering a canned set of events on the first watch
    // and keeping the stream open afterwards.
    struct StubSpeaker {
        global: GlobalInfo,
        initial: Mutex<Vec<WatchEvent>>,
        watch_senders: Mutex<Vec<Sender<WatchEvent>>>,
    }

    impl StubSpeaker {
        fn new(global: GlobalInfo, initial: Vec<WatchEvent>) -> StubSpeaker {
            StubSpeaker {
                global,
                initial: Mutex::new(initial),
                watch_senders: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl SpeakerRpc for StubSpeaker {
        async fn watch(&self) -> Result<Receiver<WatchEvent>, Error> {
            let (event_tx, event_rx) = mpsc::channel(16);
            for event in self.initial.lock().unwrap().drain(..) {
                event_tx.try_send(event).unwrap();
            }
            self.watch_senders.lock().unwrap().push(event_tx);
            Ok(event_rx)
        }

        async fn add_path(
            &self,
            _table: Table,
            _path: Path,
        ) -> Result<(), Error> {
            Ok(())
        }

        async fn delete_path(
            &self,
            _table: Table,
            _path: Path,
        ) -> Result<(), Error> {
            Ok(())
        }

        async fn get_global(&self) -> Result<GlobalInfo, Error> {
            Ok(self.global)
        }

        async fn add_vrf(&self, _vrf: VrfMsg) -> Result<(), Error> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn watch_events_are_fanned_out_until_close() {
        let stub = Arc::new(StubSpeaker::new(
            GlobalInfo::new(Ipv4Addr::new(10, 0, 0, 1), 65000),
            vec![WatchEvent::PeerUpdate { paths: vec![] }],
        ));
        let client = SpeakerClient::new(stub);

        let mut first = client.subscribe();
        let mut second = client.subscribe();
        let _watch_task = client.start_watch();

        for events in [&mut first, &mut second] {
            assert!(matches!(
                events.recv().await,
                Some(WatchEvent::PeerUpdate { .. })
            ));
        }

        client.close();
        for events in [&mut first, &mut second] {
            loop {
                match events.recv().await {
                    Some(WatchEvent::Closed) => break,
                    Some(_) => continue,
                    None => panic!("watch closed without a Closed event"),
                }
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn readiness_waits_for_a_configured_speaker() {
        // The speaker reports an unconfigured identity at first.
        struct FlakySpeaker {
            calls: Mutex<u32>,
        }

        #[async_trait]
        impl SpeakerRpc for FlakySpeaker {
            async fn watch(&self) -> Result<Receiver<WatchEvent>, Error> {
                Err(Error::Closed)
            }

            async fn add_path(
                &self,
                _table: Table,
                _path: Path,
            ) -> Result<(), Error> {
                Ok(())
            }

            async fn delete_path(
                &self,
                _table: Table,
                _path: Path,
            ) -> Result<(), Error> {
                Ok(())
            }

            async fn get_global(&self) -> Result<GlobalInfo, Error> {
                let mut calls = self.calls.lock().unwrap();
                *calls += 1;
                if *calls < 3 {
                    Ok(GlobalInfo::new(Ipv4Addr::UNSPECIFIED, 0))
                } else {
                    Ok(GlobalInfo::new(Ipv4Addr::new(10, 0, 0, 1), 65000))
                }
            }

            async fn add_vrf(&self, _vrf: VrfMsg) -> Result<(), Error> {
                Ok(())
            }
        }

        let stub = Arc::new(FlakySpeaker { calls: Mutex::new(0) });
        let client = SpeakerClient::new(stub);

        let global = client.wait_ready().await;
        assert_eq!(global.router_id, Ipv4Addr::new(10, 0, 0, 1));
        assert_eq!(global.local_as, 65000);
    }
}

