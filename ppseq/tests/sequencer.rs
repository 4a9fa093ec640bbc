use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Barrier,
    },
};

use ppseq::prelude::*;
use tempfile::TempDir;

struct Fixture {
    _dir: TempDir,
    link: Emulated,
    sequencer: Sequencer,
}

fn option(dir: &TempDir) -> SequencerOption {
    SequencerOption {
        local_cache_dir: dir.path().join("cache"),
        config_dir: dir.path().join("configurations"),
        ..Default::default()
    }
}

fn fixture_with(link: Arc<dyn DeviceLink>, emulated: Emulated) -> anyhow::Result<Fixture> {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let dir = tempfile::tempdir()?;
    let device = Device::connect("test", link, option(&dir))?;
    let sequencer = Sequencer::new(Arc::new(device), Arc::new(emulated.sleeper()))?;
    Ok(Fixture {
        _dir: dir,
        link: emulated,
        sequencer,
    })
}

fn fixture() -> anyhow::Result<Fixture> {
    let link = Emulated::default();
    fixture_with(Arc::new(link.clone()), link)
}

fn idle(f: &Fixture) -> anyhow::Result<()> {
    f.sequencer
        .set_queue_text("delay=[1ms, 2ms]", "queue1", Some("queue1"), Some("queue1"))?;
    f.sequencer.wait_uploaded("queue1")?;
    f.link.emulator().run(48);
    assert_eq!("queue1", f.link.emulator().variable("queue_name"));
    Ok(())
}

fn scan(n: usize, laser_on: bool) -> Sequences {
    Sequences::new(
        (1..=n)
            .map(|i| SequenceParameters {
                delay: i as f64 * 10. * us,
                laser_on,
                ..Default::default()
            })
            .collect(),
    )
}

fn on_device(f: &Fixture, ids: &[String]) -> usize {
    let emulator = f.link.emulator();
    ids.iter()
        .collect::<HashSet<_>>()
        .into_iter()
        .filter(|id| {
            emulator
                .exists(&format!("{}/{}", emulator.sequence_dir(), id))
                .unwrap_or(false)
        })
        .count()
}

#[test]
fn queue_content_after_upload() -> anyhow::Result<()> {
    let f = fixture()?;
    let sequences = Sequences::try_parse("delay=[1ms, 1ms]")?;
    f.sequencer
        .set_queue_sequences(sequences.clone(), "queue2", None, None)?;
    let ids = f.sequencer.wait_uploaded("queue2")?;

    let expect = sequences
        .iter()
        .map(|s| f.sequencer.device().describe(s).id)
        .collect::<Vec<_>>();
    assert_eq!(expect, ids);
    assert_eq!(ids[0], ids[1]);
    assert_eq!(ids, f.sequencer.queue_content("queue2")?);
    assert_eq!(ids, f.link.emulator().queue("queue2"));
    assert_eq!(1, on_device(&f, &ids));
    assert_eq!(Some(QueueState::Published(ids.clone())), f.sequencer.queue_state("queue2"));
    assert!(f.sequencer.queue_ready("queue2")?);

    let events = f.sequencer.events().drain().collect::<Vec<_>>();
    assert!(events.contains(&UploadEvent::Progress {
        queue: "queue2".to_owned(),
        uploaded: 1,
        total: 1
    }));
    assert_eq!(
        Some(&UploadEvent::Published {
            queue: "queue2".to_owned(),
            ids
        }),
        events.last()
    );
    Ok(())
}

#[test]
fn reference_scan_points_share_a_packet() -> anyhow::Result<()> {
    let f = fixture()?;
    f.sequencer.set_queue_text(
        "interleave(-10us, log_series(1ms, 178ms, steps_per_decade=4))",
        "queue2",
        None,
        None,
    )?;
    let ids = f.sequencer.wait_uploaded("queue2")?;
    assert_eq!(21, ids.len());
    assert_eq!(11, ids.iter().collect::<HashSet<_>>().len());
    assert_eq!(1, ids.iter().step_by(2).collect::<HashSet<_>>().len());
    assert_eq!(11, on_device(&f, &ids));
    Ok(())
}

#[test]
fn unread_events_are_bounded() -> anyhow::Result<()> {
    let link = Emulated::default();
    let dir = tempfile::tempdir()?;
    let device = Device::connect(
        "test",
        Arc::new(link.clone()),
        SequencerOption {
            event_capacity: 4,
            ..option(&dir)
        },
    )?;
    let sequencer = Sequencer::new(Arc::new(device), Arc::new(link.sleeper()))?;
    for queue in ["queue1", "queue2"] {
        sequencer.set_queue_sequences(scan(10, true), queue, None, None)?;
        sequencer.wait_uploaded(queue)?;
    }

    let events = sequencer.events().drain().collect::<Vec<_>>();
    assert_eq!(4, events.len());
    assert!(matches!(
        events.last(),
        Some(UploadEvent::Published { queue, .. }) if queue == "queue2"
    ));
    Ok(())
}

#[test]
fn queue_names_published_after_upload() -> anyhow::Result<()> {
    let f = fixture()?;
    f.sequencer
        .set_queue_text("delay=[1ms, 2ms]", "queue1", Some("queue1"), Some("queue2"))?;
    f.sequencer.wait_uploaded("queue1")?;
    assert_eq!("queue1", f.link.emulator().variable("default_queue_name"));
    assert_eq!("queue2", f.link.emulator().variable("next_queue_name"));
    Ok(())
}

#[test]
fn acquisition_from_idle() -> anyhow::Result<()> {
    let f = fixture()?;
    idle(&f)?;

    f.sequencer
        .set_queue_text("delay=[1ms, 2ms]", "queue", None, None)?;
    f.sequencer.acquisition_start()?;
    let progress = f.sequencer.progress()?;
    assert!(progress.queue_active);
    assert_eq!("queue", progress.queue_name);
    assert_eq!(0, progress.image_number);
    assert_eq!(0, progress.repeat_count);

    f.link.emulator().run(2 * 48);
    let progress = f.sequencer.progress()?;
    assert_eq!(2, progress.image_number);
    assert!(!progress.queue_active);
    assert_eq!("queue1", progress.queue_name);
    Ok(())
}

#[test]
fn acquisition_range() -> anyhow::Result<()> {
    let f = fixture()?;
    f.sequencer
        .set_queue_text("delay=[1ms, 2ms]", "queue", None, None)?;
    f.sequencer.acquisition_start_with_range(3..5)?;

    let emulator = f.link.emulator();
    assert!(emulator.queue_active());
    assert_eq!(1, emulator.counter("queue", "sequence_count"));
    assert_eq!(1, emulator.counter("queue", "repeat_count"));
    assert_eq!(3, emulator.counter("queue", "max_repeat_count"));
    Ok(())
}

#[test]
fn cancel_and_resume() -> anyhow::Result<()> {
    let f = fixture()?;
    idle(&f)?;
    f.sequencer
        .set_queue_text("delay=[1ms, 2ms, 3ms]", "queue", None, None)?;
    f.sequencer.acquisition_start_with_range(0..300)?;
    f.link.emulator().run(100);

    f.sequencer.cancel()?;
    f.sequencer.wait_inactive()?;
    let progress = f.sequencer.progress()?;
    assert!(!progress.queue_active);
    assert_eq!("queue1", progress.queue_name);
    assert_eq!(2, progress.image_number);

    f.sequencer.resume()?;
    let progress = f.sequencer.progress()?;
    assert!(progress.queue_active);
    assert_eq!("queue", progress.queue_name);
    Ok(())
}

#[test]
fn empty_queue() -> anyhow::Result<()> {
    let f = fixture()?;
    f.sequencer
        .set_queue_sequences(Sequences::default(), "queue", None, None)?;
    assert_eq!(
        Err(SequencerError::EmptyQueue("queue".to_owned())),
        f.sequencer.acquisition_start()
    );
    assert!(!f.sequencer.queue_ready("queue")?);
    assert_eq!(
        Err(SequencerError::EmptyQueue("queue".to_owned())),
        f.sequencer.resume()
    );
    Ok(())
}

#[test]
fn readiness() -> anyhow::Result<()> {
    let f = fixture()?;
    assert!(!f.sequencer.queue_ready("queue1")?);

    f.sequencer
        .set_queue_text("delay=[1ms, 2ms]", "queue1", None, None)?;
    let ids = f.sequencer.wait_uploaded("queue1")?;
    assert!(f.sequencer.queue_ready("queue1")?);

    let cache = f.sequencer.device().cache().clone();
    f.link.del(&cache.remote_path(&ids[0]))?;
    assert!(!f.sequencer.queue_ready("queue1")?);
    f.sequencer.wait_ready("queue1")?;
    assert_eq!(2, on_device(&f, &ids));

    f.sequencer
        .set_queue_text("delay=[1ms, 2ms, 3ms, 4ms]", "queue2", None, None)?;
    let ids = f.sequencer.wait_uploaded("queue2")?;
    f.link.del(&cache.remote_path(&ids[3]))?;
    assert!(f.sequencer.queue_ready("queue2")?);
    Ok(())
}

struct GatedLink {
    inner: Emulated,
    packets: AtomicUsize,
    gate_after: usize,
    barrier: Arc<Barrier>,
}

impl GatedLink {
    fn is_packet(path: &str) -> bool {
        path.rsplit('/')
            .next()
            .is_some_and(|name| name.len() == 32 && name.chars().all(|c| c.is_ascii_hexdigit()))
    }
}

impl DeviceLink for GatedLink {
    fn put(&self, path: &str, data: &[u8]) -> Result<(), LinkError> {
        self.inner.put(path, data)?;
        if Self::is_packet(path) && self.packets.fetch_add(1, Ordering::SeqCst) + 1 == self.gate_after {
            self.barrier.wait();
            self.barrier.wait();
        }
        Ok(())
    }

    fn get(&self, path: &str) -> Result<Vec<u8>, LinkError> {
        self.inner.get(path)
    }

    fn del(&self, path: &str) -> Result<(), LinkError> {
        self.inner.del(path)
    }

    fn exists(&self, path: &str) -> Result<bool, LinkError> {
        self.inner.exists(path)
    }

    fn dir(&self, pattern: &str) -> Result<Vec<String>, LinkError> {
        self.inner.dir(pattern)
    }

    fn size(&self, path: &str) -> Result<u64, LinkError> {
        self.inner.size(path)
    }
}

#[test]
fn supersede_midway() -> anyhow::Result<()> {
    let emulated = Emulated::default();
    let barrier = Arc::new(Barrier::new(2));
    let link = Arc::new(GatedLink {
        inner: emulated.clone(),
        packets: AtomicUsize::new(0),
        gate_after: 5,
        barrier: barrier.clone(),
    });
    let f = fixture_with(link.clone(), emulated)?;

    let s = scan(100, false);
    let t = scan(50, true);
    f.sequencer
        .set_queue_sequences(s.clone(), "queue", None, None)?;
    barrier.wait();
    assert!(f.link.emulator().queue("queue").is_empty());
    f.sequencer
        .set_queue_sequences(t.clone(), "queue", None, None)?;
    barrier.wait();

    let ids = f.sequencer.wait_uploaded("queue")?;
    let device = f.sequencer.device();
    let s_ids = s
        .clone()
        .with_acquiring(true)
        .iter()
        .map(|seq| device.describe(seq).id)
        .collect::<Vec<_>>();
    let t_ids = t
        .clone()
        .with_acquiring(true)
        .iter()
        .map(|seq| device.describe(seq).id)
        .collect::<Vec<_>>();

    assert_eq!(t_ids, ids);
    assert_eq!(t_ids, f.link.emulator().queue("queue"));
    assert_eq!(5, on_device(&f, &s_ids));
    assert_eq!(50, on_device(&f, &t_ids));
    assert_eq!(55, link.packets.load(Ordering::SeqCst));
    assert!(f
        .sequencer
        .events()
        .drain()
        .any(|e| e == UploadEvent::Superseded { queue: "queue".to_owned() }));
    Ok(())
}

#[test]
fn offline_device() -> anyhow::Result<()> {
    let f = fixture()?;
    assert!(f.sequencer.is_online());
    f.link.emulator().break_down();
    assert!(!f.sequencer.is_online());

    assert!(matches!(f.sequencer.progress(), Err(SequencerError::Link(_))));
    f.sequencer
        .set_queue_text("delay=[1ms]", "queue1", None, None)?;
    assert!(matches!(
        f.sequencer.wait_uploaded("queue1"),
        Err(SequencerError::UploadFailed { .. })
    ));
    assert!(matches!(
        f.sequencer.queue_state("queue1"),
        Some(QueueState::Failed(_))
    ));

    f.link.emulator().repair();
    f.sequencer
        .set_queue_text("delay=[1ms]", "queue1", None, None)?;
    assert_eq!(1, f.sequencer.wait_uploaded("queue1")?.len());
    Ok(())
}

#[test]
fn registry_and_configurations() -> anyhow::Result<()> {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let dir = tempfile::tempdir()?;
    let links = Arc::new(std::sync::Mutex::new(std::collections::HashMap::<String, Emulated>::new()));
    let registry = DeviceRegistry::new({
        let option = option(&dir);
        let links = links.clone();
        move |domain| {
            let link = links
                .lock()
                .unwrap()
                .entry(domain.to_owned())
                .or_default()
                .clone();
            Sequencer::open(domain, Arc::new(link), option.clone())
        }
    });

    let biocars = registry.get("BioCARS")?;
    let store = ConfigurationStore::new(&biocars.device().option().config_dir);
    biocars.device().set_channel(
        Channel::new(1)?
            .with_mnemonic("xosct")
            .with_pp_enabled(true),
    )?;
    store.save("BioCARS", biocars.device())?;

    let laserlab = registry.get("LaserLab")?;
    assert_eq!(
        vec!["ch1".to_owned()],
        store.load("BioCARS", laserlab.device())?
    );
    assert!(laserlab.device().channels().channel(1)?.pp_enabled());
    assert!(store.load("BioCARS", laserlab.device())?.is_empty());
    assert_eq!(biocars.device().parameters(), laserlab.device().parameters());
    Ok(())
}
