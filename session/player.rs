// This file is part of guacplay, a Guacamole session recording player.
// Copyright (C) 2026 The guacplay Authors.
// SPDX-License-Identifier: GPL-3.0-or-later

//! The playback engine: ingest of the blob into the frame index, seek with
//! keyframe-snapshot baselines, and real-time scheduled frame advance, all
//! coordinated by a single task.

use crate::client::Client;
use crate::index::{FrameIndex, Indexer, BLOCK_SIZE};
use crate::parser::Parser;
use crate::source::Source;
use crate::tunnel::PlaybackTunnel;
use base::time::{Duration, Timestamp};
use base::{bail, Error};
use bytes::Bytes;
use std::future::Future;
use std::ops::Range;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration as StdDuration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, info_span, trace, warn, Instrument};

/// Events emitted by a [`SessionRecording`]. Delivered in order on the
/// receiver returned from [`SessionRecording::new`]; dropping the receiver
/// merely discards them.
#[derive(Debug)]
pub enum Event {
    /// The whole blob has been indexed.
    Load,
    /// Indexing or replay failed. Already-indexed frames remain playable.
    Error(Error),
    /// Ingest was aborted. Emitted at most once.
    Abort,
    /// A frame was indexed: the indexed duration so far and the byte
    /// offset parsed so far. `parsed` is strictly increasing.
    Progress { duration: Duration, parsed: u64 },
    /// A play run began.
    Play,
    /// Playback stopped, either on request or at end of stream.
    Pause,
    /// A frame was rendered: its offset from the first frame, and this
    /// step's progress through the seek that rendered it.
    Seek {
        position: Duration,
        step: usize,
        total: usize,
    },
}

enum Command {
    Play(oneshot::Sender<()>),
    Pause(oneshot::Sender<()>),
    Seek {
        position: Duration,
        done: oneshot::Sender<()>,
    },
    Cancel(oneshot::Sender<()>),
    Abort(oneshot::Sender<()>),
}

#[derive(Default)]
struct Status {
    playing: AtomicBool,
    /// Relative position of the rendered frame, in ms.
    position: AtomicI64,
    /// Indexed duration, in ms.
    duration: AtomicI64,
    frames: AtomicUsize,
}

/// Resolves once the corresponding seek has completed, been superseded by
/// a later seek, or been cancelled. The seek proceeds whether or not this
/// is awaited.
pub struct Seeked(oneshot::Receiver<()>);

impl Future for Seeked {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        // A dropped sender means the seek was a no-op; that also counts
        // as done.
        Pin::new(&mut self.get_mut().0).poll(cx).map(|_| ())
    }
}

/// A loaded session recording and its playback state.
///
/// Constructing one starts indexing the byte source immediately in the
/// background; playback operations may be issued while indexing is still
/// running. Dropping the last handle tears the playback task down.
pub struct SessionRecording {
    cmd: mpsc::UnboundedSender<Command>,
    status: Arc<Status>,
}

impl SessionRecording {
    /// Starts ingest of `source`, driving `client` during playback. Must
    /// be called within a tokio runtime.
    pub fn new<S: Source, C: Client>(
        source: S,
        client: C,
    ) -> (Self, mpsc::UnboundedReceiver<Event>) {
        let (cmd, cmds) = mpsc::unbounded_channel();
        let (events, event_rx) = mpsc::unbounded_channel();
        let status = Arc::new(Status::default());
        let player = Player {
            source,
            tunnel: PlaybackTunnel::new(client),
            index: FrameIndex::new(),
            ingest: Ingest::Running {
                indexer: Indexer::new(),
                pos: 0,
            },
            current: None,
            play_start: None,
            seek: None,
            aborted: false,
            cmds,
            events,
            status: status.clone(),
        };
        tokio::spawn(player.run().instrument(info_span!("playback")));
        (SessionRecording { cmd, status }, event_rx)
    }

    /// Begins playback from the frame after the current one. A no-op if
    /// already playing or if no such frame has been indexed yet.
    pub async fn play(&self) {
        self.roundtrip(Command::Play).await;
    }

    /// Stops playback and aborts any in-flight seek. Idempotent.
    pub async fn pause(&self) {
        self.roundtrip(Command::Pause).await;
    }

    /// Cancels an in-flight seek: its [`Seeked`] future resolves, and
    /// playback resumes if it was running when the seek began.
    pub async fn cancel(&self) {
        self.roundtrip(Command::Cancel).await;
    }

    /// Stops ingest permanently. Frames indexed so far remain playable.
    pub async fn abort(&self) {
        self.roundtrip(Command::Abort).await;
    }

    /// Moves playback to the frame nearest `position` (an offset from the
    /// first frame). A no-op if nothing has been indexed yet.
    pub fn seek(&self, position: Duration) -> Seeked {
        let (done, rx) = oneshot::channel();
        let _ = self.cmd.send(Command::Seek { position, done });
        Seeked(rx)
    }

    pub fn is_playing(&self) -> bool {
        self.status.playing.load(Ordering::SeqCst)
    }

    /// Offset of the rendered frame from the first frame, or zero if
    /// nothing has rendered yet.
    pub fn position(&self) -> Duration {
        Duration(self.status.position.load(Ordering::SeqCst))
    }

    /// Span from the first to the last indexed frame. Grows monotonically
    /// while ingest proceeds.
    pub fn duration(&self) -> Duration {
        Duration(self.status.duration.load(Ordering::SeqCst))
    }

    pub fn num_frames(&self) -> usize {
        self.status.frames.load(Ordering::SeqCst)
    }

    async fn roundtrip(&self, make: impl FnOnce(oneshot::Sender<()>) -> Command) {
        let (tx, rx) = oneshot::channel();
        if self.cmd.send(make(tx)).is_ok() {
            let _ = rx.await;
        }
    }
}

enum Ingest {
    Running { indexer: Indexer, pos: u64 },
    Done,
    Failed,
    Aborted,
}

impl Ingest {
    fn is_running(&self) -> bool {
        matches!(self, Ingest::Running { .. })
    }
}

/// Clocks of the current play run: the recording time of the frame the
/// run began at, and the wall clock at that moment.
struct PlayStart {
    video: Timestamp,
    real: Instant,
}

struct ActiveSeek {
    target: usize,
    /// Baseline index, for step accounting in `Seek` events.
    start: usize,
    done: Option<oneshot::Sender<()>>,
    /// Whether playback should resume once the seek completes (or is
    /// cancelled).
    resume: bool,
}

struct Player<S: Source, C: Client> {
    source: S,
    tunnel: PlaybackTunnel<C>,
    index: FrameIndex<C::State>,
    ingest: Ingest,
    /// Index of the frame currently rendered by the client; `None` until
    /// the first replay.
    current: Option<usize>,
    /// Present iff playing.
    play_start: Option<PlayStart>,
    seek: Option<ActiveSeek>,
    /// Ingest abort latch; never cleared.
    aborted: bool,
    cmds: mpsc::UnboundedReceiver<Command>,
    events: mpsc::UnboundedSender<Event>,
    status: Arc<Status>,
}

async fn read_chunk<S: Source>(source: &S, range: Range<u64>) -> Result<Bytes, Error> {
    source.read(range).await
}

impl<S: Source, C: Client> Player<S, C> {
    /// One iteration per suspension point: commands first, then an
    /// in-flight seek step, then the playback timer, then ingest. A seek
    /// that is superseded, or playback that is paused, is therefore
    /// observed between frames, never mid-frame.
    async fn run(mut self) {
        const IDLE: StdDuration = StdDuration::from_secs(3600);
        loop {
            self.poll_ingest_complete();
            self.poll_end_of_stream();
            let deadline = self.next_deadline();
            let sleep_until = deadline.unwrap_or_else(|| Instant::now() + IDLE);
            let chunk = self.chunk_range();
            let read_range = chunk.clone().unwrap_or(0..0);
            tokio::select! {
                biased;
                cmd = self.cmds.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd),
                    None => break, // all handles dropped
                },
                () = std::future::ready(()), if self.seek.is_some() => self.seek_step().await,
                () = tokio::time::sleep_until(sleep_until), if deadline.is_some() => {
                    self.advance_playback().await;
                }
                data = read_chunk(&self.source, read_range), if chunk.is_some() => {
                    self.on_chunk(data);
                }
            }
        }
        debug!("playback task exiting");
    }

    fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Play(ack) => {
                self.start_playback();
                let _ = ack.send(());
            }
            Command::Pause(ack) => {
                self.pause_cmd();
                let _ = ack.send(());
            }
            Command::Seek { position, done } => self.begin_seek(position, done),
            Command::Cancel(ack) => {
                self.cancel_seek();
                let _ = ack.send(());
            }
            Command::Abort(ack) => {
                self.abort_ingest();
                let _ = ack.send(());
            }
        }
    }

    fn send(&self, event: Event) {
        // an absent listener is fine
        let _ = self.events.send(event);
    }

    fn next_index(&self) -> usize {
        self.current.map_or(0, |c| c + 1)
    }

    fn set_current(&mut self, i: Option<usize>) {
        self.current = i;
        let position = match i {
            Some(i) => self
                .index
                .relative(self.index.get(i).expect("current frame is indexed").timestamp),
            None => Duration::ZERO,
        };
        self.status.position.store(position.0, Ordering::SeqCst);
    }

    fn poll_ingest_complete(&mut self) {
        if let Ingest::Running { pos, .. } = &self.ingest {
            if *pos >= self.source.len() {
                debug!(
                    frames = self.index.len(),
                    bytes = *pos,
                    "recording fully indexed"
                );
                self.ingest = Ingest::Done;
                self.send(Event::Load);
            }
        }
    }

    /// A play run that has rendered the last indexed frame ends cleanly
    /// once no further frame can ever arrive.
    fn poll_end_of_stream(&mut self) {
        if self.play_start.is_some()
            && self.seek.is_none()
            && self.next_index() >= self.index.len()
            && !self.ingest.is_running()
        {
            self.pause_playback();
        }
    }

    fn next_deadline(&self) -> Option<Instant> {
        if self.seek.is_some() {
            return None;
        }
        let play = self.play_start.as_ref()?;
        let next = self.index.get(self.next_index())?;
        // late frames get a zero delay and catch up to real time
        Some(play.real + (next.timestamp - play.video).to_std())
    }

    fn chunk_range(&self) -> Option<Range<u64>> {
        match &self.ingest {
            Ingest::Running { pos, .. } => {
                let len = self.source.len();
                (*pos < len).then(|| *pos..len.min(*pos + BLOCK_SIZE))
            }
            _ => None,
        }
    }

    fn start_playback(&mut self) {
        if self.play_start.is_some() {
            return;
        }
        let Some(next) = self.index.get(self.next_index()) else {
            return;
        };
        self.send(Event::Play);
        debug!(from = %next.timestamp, "playing");
        self.play_start = Some(PlayStart {
            video: next.timestamp,
            real: Instant::now(),
        });
        self.status.playing.store(true, Ordering::SeqCst);
    }

    fn pause_playback(&mut self) {
        if self.play_start.take().is_some() {
            self.send(Event::Pause);
            self.status.playing.store(false, Ordering::SeqCst);
        }
    }

    /// User-visible pause: aborts any in-flight seek, firing its
    /// completion exactly once without restoring playback, then stops the
    /// clock. Idempotent.
    fn pause_cmd(&mut self) {
        if let Some(mut seek) = self.seek.take() {
            if let Some(done) = seek.done.take() {
                let _ = done.send(());
            }
        }
        self.pause_playback();
    }

    /// Cancels an in-flight seek: playback resumes if it was running when
    /// the seek began, and the seek's completion fires exactly once.
    fn cancel_seek(&mut self) {
        let Some(mut seek) = self.seek.take() else {
            return;
        };
        if seek.resume {
            self.start_playback();
        }
        if let Some(done) = seek.done.take() {
            let _ = done.send(());
        }
    }

    fn begin_seek(&mut self, position: Duration, done: oneshot::Sender<()>) {
        if self.index.is_empty() {
            // nothing to seek within; dropping `done` resolves the future
            return;
        }
        self.cancel_seek(); // supersede, restoring the prior seek's play state
        let was_playing = self.play_start.is_some();
        self.pause_playback();
        let target = self.index.find(position).expect("index is non-empty");
        let start = self.establish_baseline(target);
        trace!(%position, target, start, "seeking");
        self.seek = Some(ActiveSeek {
            target,
            start,
            done: Some(done),
            resume: was_playing,
        });
    }

    /// Walks backward from `target` to the nearest usable baseline: the
    /// currently rendered frame, or a keyframe whose snapshot is restored
    /// into the client. Failing both, replay starts over from frame 0
    /// against the client's initial blank display. Returns the baseline
    /// index for step accounting.
    fn establish_baseline(&mut self, target: usize) -> usize {
        let mut i = target;
        loop {
            if Some(i) == self.current {
                return i;
            }
            if let Some(state) = self.index.get(i).and_then(|f| f.state.as_ref()) {
                trace!(keyframe = i, "restoring snapshot");
                self.tunnel.client_mut().import_state(state);
                self.set_current(Some(i));
                return i;
            }
            if i == 0 {
                self.set_current(None);
                return 0;
            }
            i -= 1;
        }
    }

    /// Replays one frame of the in-flight seek, or completes it.
    async fn seek_step(&mut self) {
        let Some(seek) = &self.seek else {
            return;
        };
        let (target, start) = (seek.target, seek.start);
        if self.current.map_or(true, |c| c < target) {
            let next = self.next_index();
            if let Err(e) = self.replay_frame(next).await {
                warn!(frame = next, err = %e.chain(), "replay failed; abandoning seek");
                self.send(Event::Error(e));
                if let Some(mut seek) = self.seek.take() {
                    if let Some(done) = seek.done.take() {
                        let _ = done.send(());
                    }
                }
                return;
            }
            let step = next - start;
            if step > 0 {
                let position = self
                    .index
                    .relative(self.index.get(next).expect("replayed frame is indexed").timestamp);
                self.send(Event::Seek {
                    position,
                    step,
                    total: target - start,
                });
            }
        }
        if self.current.map_or(false, |c| c >= target) {
            self.finish_seek();
        }
    }

    fn finish_seek(&mut self) {
        let Some(mut seek) = self.seek.take() else {
            return;
        };
        if seek.resume {
            self.start_playback();
        }
        if let Some(done) = seek.done.take() {
            let _ = done.send(());
        }
    }

    /// Renders the next frame of a play run at its scheduled time.
    async fn advance_playback(&mut self) {
        let next = self.next_index();
        let had_baseline = self.current.is_some();
        match self.replay_frame(next).await {
            Ok(()) => {
                // the very first frame of a fresh client renders with no
                // baseline and reports no progress, matching seek replay
                if had_baseline {
                    let position = self
                        .index
                        .relative(self.index.get(next).expect("replayed frame is indexed").timestamp);
                    self.send(Event::Seek {
                        position,
                        step: 1,
                        total: 1,
                    });
                }
            }
            Err(e) => {
                warn!(frame = next, err = %e.chain(), "replay failed; pausing");
                self.send(Event::Error(e));
                self.pause_playback();
            }
        }
    }

    /// Feeds every instruction of frame `i` through the playback tunnel,
    /// then captures a state snapshot if the frame is keyframe-eligible
    /// and has none yet.
    async fn replay_frame(&mut self, i: usize) -> Result<(), Error> {
        let (range, keyframe) = {
            let frame = self.index.get(i).expect("replayed frame is indexed");
            (frame.start..frame.end, frame.keyframe)
        };
        trace!(frame = i, ?range, "replaying");
        let data = self.source.read(range.clone()).await?;
        let mut parser = Parser::new(range.start);
        parser.feed(&data)?;
        while let Some((instruction, _)) = parser.pop() {
            self.tunnel.receive(&instruction);
        }
        if !parser.is_idle() {
            bail!(
                Internal,
                msg("frame {i} byte range {range:?} ends mid-instruction")
            );
        }
        if keyframe
            && self
                .index
                .get(i)
                .expect("replayed frame is indexed")
                .state
                .is_none()
        {
            let state = self.tunnel.client_mut().export_state().await;
            self.index.set_state(i, state);
        }
        self.set_current(Some(i));
        Ok(())
    }

    fn on_chunk(&mut self, data: Result<Bytes, Error>) {
        if !self.ingest.is_running() {
            return;
        }
        let data = match data {
            Ok(data) => data,
            Err(e) => {
                warn!(err = %e.chain(), "read failed; stopping load");
                self.ingest = Ingest::Failed;
                self.send(Event::Error(e));
                return;
            }
        };
        let (progress, result) = match &mut self.ingest {
            Ingest::Running { indexer, pos } => {
                *pos += data.len() as u64;
                indexer.ingest(&data, &mut self.index)
            }
            _ => unreachable!("checked above"),
        };
        self.status
            .duration
            .store(self.index.duration().0, Ordering::SeqCst);
        self.status.frames.store(self.index.len(), Ordering::SeqCst);
        for p in progress {
            self.send(Event::Progress {
                duration: p.duration,
                parsed: p.parsed,
            });
        }
        if let Err(e) = result {
            warn!(err = %e.chain(), "indexing failed; stopping load");
            self.ingest = Ingest::Failed;
            self.send(Event::Error(e));
        }
    }

    /// Latches the ingest abort. Replay and already-indexed frames are
    /// unaffected.
    fn abort_ingest(&mut self) {
        if self.aborted {
            return;
        }
        self.aborted = true;
        if self.ingest.is_running() {
            debug!("load aborted");
            self.ingest = Ingest::Aborted;
        }
        self.send(Event::Abort);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::BufferSource;
    use crate::testutil::{self, logged_client, padding, sync, ClientLog};
    use base::ErrorKind;
    use std::sync::Mutex;

    async fn load(
        blob: &str,
    ) -> (
        SessionRecording,
        mpsc::UnboundedReceiver<Event>,
        Arc<Mutex<ClientLog>>,
    ) {
        testutil::init();
        let (client, log) = logged_client();
        let (recording, mut events) = SessionRecording::new(BufferSource::new(blob), client);
        loop {
            match events.recv().await.expect("engine alive") {
                Event::Load => break,
                Event::Progress { .. } => {}
                e => panic!("unexpected event while loading: {e:?}"),
            }
        }
        (recording, events, log)
    }

    /// Ten frames at 1000, 1100, ... 1900 ms.
    fn ten_frames() -> String {
        (0..10).map(|i| sync(1_000 + i * 100)).collect()
    }

    fn drain(events: &mut mpsc::UnboundedReceiver<Event>) -> Vec<Event> {
        let mut out = Vec::new();
        while let Ok(e) = events.try_recv() {
            out.push(e);
        }
        out
    }

    async fn next_event(events: &mut mpsc::UnboundedReceiver<Event>) -> Event {
        events.recv().await.expect("engine alive")
    }

    fn seeks(events: &[Event]) -> Vec<(i64, usize, usize)> {
        events
            .iter()
            .filter_map(|e| match e {
                Event::Seek {
                    position,
                    step,
                    total,
                } => Some((position.0, *step, *total)),
                _ => None,
            })
            .collect()
    }

    fn plays(events: &[Event]) -> usize {
        events.iter().filter(|e| matches!(e, Event::Play)).count()
    }

    #[tokio::test(start_paused = true)]
    async fn indexes_in_background() {
        let (recording, mut events, log) = load(&ten_frames()).await;
        assert_eq!(recording.num_frames(), 10);
        assert_eq!(recording.duration(), Duration(900));
        assert_eq!(recording.position(), Duration::ZERO);
        assert!(!recording.is_playing());
        assert!(drain(&mut events).is_empty());
        let log = log.lock().unwrap();
        assert_eq!(log.connects, 1);
        assert_eq!(log.cursor_shown, Some(false));
    }

    #[tokio::test(start_paused = true)]
    async fn progress_is_ordered_and_load_fires_last() {
        testutil::init();
        let blob = ten_frames();
        let (client, _log) = logged_client();
        let (recording, mut events) = SessionRecording::new(BufferSource::new(blob.as_str()), client);
        let mut parsed = 0;
        let mut frames = 0;
        loop {
            match next_event(&mut events).await {
                Event::Progress { parsed: p, .. } => {
                    assert!(p > parsed);
                    parsed = p;
                    frames += 1;
                }
                Event::Load => break,
                e => panic!("unexpected event while loading: {e:?}"),
            }
        }
        assert_eq!(frames, 10);
        assert_eq!(parsed, blob.len() as u64);
        assert_eq!(recording.num_frames(), 10);
    }

    /// Seek before play: the target frame renders, progress is reported
    /// per replayed frame, and playback stays stopped.
    #[tokio::test(start_paused = true)]
    async fn seek_before_play() {
        let (recording, mut events, log) = load(&ten_frames()).await;
        recording.seek(Duration(450)).await;
        assert_eq!(recording.position(), Duration(400));
        assert!(!recording.is_playing());
        let events = drain(&mut events);
        assert_eq!(
            seeks(&events),
            vec![(100, 1, 4), (200, 2, 4), (300, 3, 4), (400, 4, 4)]
        );
        assert_eq!(plays(&events), 0);
        let log = log.lock().unwrap();
        assert_eq!(log.ops.len(), 5); // frames 0..=4, one sync each
        assert_eq!(log.exports, 1); // frame 0's keyframe snapshot
    }

    #[tokio::test(start_paused = true)]
    async fn seek_is_idempotent() {
        let (recording, mut events, log) = load(&ten_frames()).await;
        recording.seek(Duration(450)).await;
        drain(&mut events);
        let rendered = log.lock().unwrap().ops.clone();
        recording.seek(Duration(450)).await;
        assert_eq!(recording.position(), Duration(400));
        assert_eq!(log.lock().unwrap().ops, rendered);
        assert!(drain(&mut events).is_empty());
    }

    /// The display state after a seek is the same whether reached
    /// directly or via intermediate seeks.
    #[tokio::test(start_paused = true)]
    async fn seek_is_deterministic() {
        let (direct, _ea, direct_log) = load(&ten_frames()).await;
        direct.seek(Duration(900)).await;
        let (stepped, _eb, stepped_log) = load(&ten_frames()).await;
        stepped.seek(Duration(400)).await;
        stepped.seek(Duration(900)).await;
        assert_eq!(direct.position(), stepped.position());
        assert_eq!(
            direct_log.lock().unwrap().ops,
            stepped_log.lock().unwrap().ops
        );
    }

    #[tokio::test(start_paused = true)]
    async fn play_paces_frames_in_real_time() {
        let (recording, mut events, _log) = load(&ten_frames()).await;
        let t0 = Instant::now();
        recording.play().await;
        let mut run = Vec::new();
        loop {
            let e = next_event(&mut events).await;
            let stop = matches!(e, Event::Pause);
            run.push(e);
            if stop {
                break;
            }
        }
        // frame 0 plays immediately, frame 9 at its 900 ms offset
        assert_eq!(t0.elapsed(), StdDuration::from_millis(900));
        assert_eq!(plays(&run), 1);
        let positions: Vec<i64> = seeks(&run).iter().map(|s| s.0).collect();
        assert_eq!(positions, vec![100, 200, 300, 400, 500, 600, 700, 800, 900]);
        assert!(!recording.is_playing());
        assert_eq!(recording.position(), Duration(900));
    }

    /// Seek during play pauses, replays, and resumes: `Play` is emitted
    /// exactly twice overall.
    #[tokio::test(start_paused = true)]
    async fn seek_during_play_stays_playing() {
        let (recording, mut events, _log) = load(&ten_frames()).await;
        recording.play().await;
        recording.seek(Duration(500)).await;
        assert!(recording.is_playing());
        let mut all = drain(&mut events);
        loop {
            let e = next_event(&mut events).await;
            let stop = matches!(e, Event::Pause);
            all.push(e);
            if stop {
                break;
            }
        }
        assert_eq!(plays(&all), 2);
        assert!(matches!(all.last(), Some(Event::Pause)));
        assert_eq!(recording.position(), Duration(900));
        assert!(!recording.is_playing());
    }

    #[tokio::test(start_paused = true)]
    async fn pause_is_idempotent_and_stops_the_clock() {
        let (recording, mut events, _log) = load(&ten_frames()).await;
        recording.pause().await; // not playing: no event
        assert!(drain(&mut events).is_empty());

        recording.play().await;
        recording.pause().await;
        let events_seen = drain(&mut events);
        assert_eq!(plays(&events_seen), 1);
        assert!(matches!(events_seen.last(), Some(Event::Pause)));
        assert!(!recording.is_playing());
        assert_eq!(recording.position(), Duration::ZERO);

        recording.pause().await;
        assert!(drain(&mut events).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn play_at_end_of_stream_is_a_noop() {
        let (recording, mut events, _log) = load(&ten_frames()).await;
        recording.seek(Duration(900)).await;
        drain(&mut events);
        recording.play().await;
        assert!(!recording.is_playing());
        assert!(drain(&mut events).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn empty_recording_degrades_gracefully() {
        testutil::init();
        let (client, _log) = logged_client();
        let (recording, mut events) = SessionRecording::new(BufferSource::default(), client);
        assert!(matches!(next_event(&mut events).await, Event::Load));
        assert_eq!(recording.duration(), Duration::ZERO);
        recording.play().await;
        assert!(!recording.is_playing());
        recording.seek(Duration(123)).await; // resolves despite being a no-op
        assert!(drain(&mut events).is_empty());
    }

    /// Cancelling an idle-state seek fires its completion exactly once
    /// and leaves playback stopped.
    #[tokio::test(start_paused = true)]
    async fn cancel_fires_completion_once() {
        let (recording, mut events, _log) = load(&ten_frames()).await;
        let pending = recording.seek(Duration(800));
        recording.cancel().await;
        pending.await;
        assert!(!recording.is_playing());
        assert_eq!(recording.position(), Duration::ZERO);
        assert!(seeks(&drain(&mut events)).is_empty());
        recording.cancel().await; // nothing outstanding: no-op
        assert!(drain(&mut events).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_mid_seek_stops_the_replay() {
        let blob: String = (0..100).map(|i| sync(i * 100)).collect();
        let (recording, mut events, _log) = load(&blob).await;
        let pending = recording.seek(Duration(9_900));
        loop {
            if matches!(next_event(&mut events).await, Event::Seek { .. }) {
                break;
            }
        }
        recording.cancel().await;
        pending.await;
        assert!(!recording.is_playing());
        assert!(recording.position() < Duration(9_900));
    }

    /// Cancelling a seek issued while playing restores the play run.
    #[tokio::test(start_paused = true)]
    async fn cancel_during_play_resumes() {
        let (recording, mut events, _log) = load(&ten_frames()).await;
        recording.play().await;
        let pending = recording.seek(Duration(700));
        recording.cancel().await;
        pending.await;
        assert!(recording.is_playing());
        let mut all = drain(&mut events);
        loop {
            let e = next_event(&mut events).await;
            let stop = matches!(e, Event::Pause);
            all.push(e);
            if stop {
                break;
            }
        }
        assert_eq!(plays(&all), 2); // initial play + post-cancel resume
    }

    #[tokio::test(start_paused = true)]
    async fn superseding_seek_completes_both() {
        let (recording, mut events, _log) = load(&ten_frames()).await;
        let first = recording.seek(Duration(900));
        let second = recording.seek(Duration(100));
        first.await;
        second.await;
        assert_eq!(recording.position(), Duration(100));
        assert_eq!(seeks(&drain(&mut events)), vec![(100, 1, 1)]);
    }

    /// A backward seek restores the nearest keyframe snapshot instead of
    /// replaying from the start.
    #[tokio::test(start_paused = true)]
    async fn backward_seek_restores_snapshot() {
        let (recording, mut events, log) = load(&ten_frames()).await;
        recording.seek(Duration(900)).await;
        assert_eq!(log.lock().unwrap().exports, 1);
        drain(&mut events);
        recording.seek(Duration::ZERO).await;
        {
            let log = log.lock().unwrap();
            assert_eq!(log.imports, 1);
            assert_eq!(log.ops, vec![("sync".to_owned(), vec!["1000".to_owned()])]);
        }
        assert_eq!(recording.position(), Duration::ZERO);
        assert!(seeks(&drain(&mut events)).is_empty());
    }

    /// A backward seek lands on a later keyframe and replays forward from
    /// it to the target.
    #[tokio::test(start_paused = true)]
    async fn backward_seek_replays_forward_from_snapshot() {
        let blob = format!(
            "{}{}{}{}{}",
            sync(0),
            padding(16_400),
            sync(6_000),
            sync(6_100),
            sync(6_200),
        );
        let (recording, mut events, log) = load(&blob).await;
        recording.seek(Duration(6_200)).await;
        assert_eq!(log.lock().unwrap().exports, 2); // frames 0 and 1
        drain(&mut events);
        recording.seek(Duration(6_100)).await;
        {
            let log = log.lock().unwrap();
            assert_eq!(log.imports, 1);
            // frame 1's snapshot (3 instructions) plus frame 2's sync
            assert_eq!(log.ops.len(), 4);
        }
        assert_eq!(recording.position(), Duration(6_100));
        assert_eq!(seeks(&drain(&mut events)), vec![(6_100, 1, 1)]);
    }

    #[tokio::test(start_paused = true)]
    async fn abort_latches_and_keeps_frames_playable() {
        let (recording, mut events, _log) = load(&ten_frames()).await;
        recording.abort().await;
        let first = drain(&mut events);
        assert_eq!(first.len(), 1);
        assert!(matches!(first[0], Event::Abort));
        recording.abort().await;
        assert!(drain(&mut events).is_empty());
        recording.seek(Duration(300)).await;
        assert_eq!(recording.position(), Duration(300));
    }

    /// Parse failure mid-stream: `Error` fires once, `Load` never does,
    /// and the already-indexed frame still plays.
    #[tokio::test(start_paused = true)]
    async fn parse_error_stops_load_but_frames_play() {
        testutil::init();
        let (client, log) = logged_client();
        let (recording, mut events) =
            SessionRecording::new(BufferSource::new("4.sync,1.0;bogus"), client);
        let mut saw_progress = false;
        loop {
            match next_event(&mut events).await {
                Event::Progress { .. } => saw_progress = true,
                Event::Error(e) => {
                    assert_eq!(e.kind(), ErrorKind::DataLoss);
                    assert!(!e.msg().unwrap().is_empty());
                    break;
                }
                e => panic!("unexpected event: {e:?}"),
            }
        }
        assert!(saw_progress);
        assert_eq!(recording.num_frames(), 1);
        recording.seek(Duration::ZERO).await;
        assert_eq!(log.lock().unwrap().ops.len(), 1);
        assert!(drain(&mut events)
            .iter()
            .all(|e| !matches!(e, Event::Load | Event::Error(_))));
    }

    struct SlowSource {
        data: Vec<u8>,
        delay: StdDuration,
    }

    #[async_trait::async_trait]
    impl Source for SlowSource {
        fn len(&self) -> u64 {
            self.data.len() as u64
        }

        async fn read(&self, range: Range<u64>) -> Result<Bytes, Error> {
            tokio::time::sleep(self.delay).await;
            Ok(Bytes::copy_from_slice(
                &self.data[range.start as usize..range.end as usize],
            ))
        }
    }

    /// Frames indexed after a play run begins become reachable on the
    /// next scheduling step; end-of-stream waits for ingest to settle.
    #[tokio::test(start_paused = true)]
    async fn frames_indexed_mid_play_become_reachable() {
        testutil::init();
        // two ingest chunks: the second carries the 2000 ms frame
        let blob = format!("{}{}{}", sync(1_000), padding(300_000), sync(2_000));
        assert!(blob.len() as u64 > BLOCK_SIZE);
        let (client, _log) = logged_client();
        let source = SlowSource {
            data: blob.into_bytes(),
            delay: StdDuration::from_millis(10),
        };
        let (recording, mut events) = SessionRecording::new(source, client);
        loop {
            if matches!(next_event(&mut events).await, Event::Progress { .. }) {
                break; // frame 0 is indexed; frame 1 is not yet
            }
        }
        recording.play().await;
        let mut run = Vec::new();
        loop {
            let e = next_event(&mut events).await;
            let stop = matches!(e, Event::Pause);
            run.push(e);
            if stop {
                break;
            }
        }
        assert_eq!(recording.position(), Duration(1_000));
        assert_eq!(seeks(&run), vec![(1_000, 1, 1)]);
        assert!(run.iter().any(|e| matches!(e, Event::Load)));
    }
}
