//! Packets sent by one station and heard by another over the loopback modem

use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use freedv_tnc::device::{LoopbackModem, MemoryAudio, NullPtt};
use freedv_tnc::engine::Engine;
use freedv_tnc::Config;

type Station = Engine<LoopbackModem, MemoryAudio, NullPtt>;

fn config() -> Config {
    let mut config = Config::default();
    config.channel.min_quiet = Duration::from_millis(10);
    config.channel.poll_interval = Duration::from_millis(1);
    config.channel.max_wait = Some(Duration::from_secs(1));
    config.transmit.lead_in = Duration::from_millis(10);
    config.transmit.lead_out = Duration::from_millis(10);
    config.transmit.drain_poll = Duration::from_millis(1);
    config
}

fn station(config: &Config, audio: MemoryAudio) -> (Station, mpsc::Receiver<Bytes>) {
    let modem = LoopbackModem::open(&config.modem).unwrap();
    let (tx, rx) = mpsc::channel(8);
    let mut engine = Engine::new(config, modem, audio, NullPtt::new(), tx, CancellationToken::new()).unwrap();
    for _ in 0..3 {
        engine.receiver.on_samples(&[0; 80]);
    }
    (engine, rx)
}

fn hear(station: &mut Station, samples: &[i16]) {
    for block in samples.chunks(80) {
        station.receiver.on_samples(block);
    }
}

#[tokio::test]
async fn test_packets_cross_the_air() {
    let config = config();
    let audio = MemoryAudio::new();
    let (mut alice, _) = station(&config, audio.clone());
    let (mut bob, mut heard) = station(&config, MemoryAudio::new());

    // Single frame, then 200 bytes over 19 fragments of 11 bytes
    let short = Bytes::from_static(b"CQ CQ");
    let long: Bytes = (0..200u16).map(|i| (i * 7) as u8).collect::<Vec<_>>().into();

    alice.transmitter.transmit(&short).await.unwrap();
    alice.transmitter.transmit(&long).await.unwrap();
    hear(&mut bob, &audio.take_samples());

    assert_eq!(heard.try_recv().unwrap(), short);
    assert_eq!(heard.try_recv().unwrap(), long);
    assert!(heard.try_recv().is_err());
    assert_eq!(bob.receiver.stats().completed, 2);
    assert_eq!(bob.receiver.stats().losses, 0);
    assert!(!alice.link.is_keyed());
}

#[tokio::test]
async fn test_lost_fragment_drops_only_that_packet() {
    let config = config();
    let audio = MemoryAudio::new();
    let (mut alice, _) = station(&config, audio.clone());
    let (mut bob, mut heard) = station(&config, MemoryAudio::new());

    alice.transmitter.transmit(&[0x55; 100]).await.unwrap();
    let mut samples = audio.take_samples();

    // Cut the sixth frame out of the recording
    let syncs: Vec<usize> = samples
        .iter()
        .enumerate()
        .filter(|&(_, &s)| s == i16::MIN)
        .map(|(i, _)| i)
        .collect();
    assert_eq!(syncs.len(), 10);
    samples.drain(syncs[5]..syncs[6]);
    hear(&mut bob, &samples);

    assert!(heard.try_recv().is_err());
    assert!(bob.receiver.stats().losses >= 1);

    alice.transmitter.transmit(b"after the gap").await.unwrap();
    hear(&mut bob, &audio.take_samples());
    assert_eq!(heard.try_recv().unwrap(), Bytes::from_static(b"after the gap"));
}
