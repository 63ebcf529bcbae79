use criterion::{black_box, criterion_group, criterion_main, Criterion};
use tokio::sync::watch;

use nova_protocol::codec::Message;
use nova_protocol::pow;

fn codec_roundtrip(c: &mut Criterion) {
    let msg = Message::PeerAnnounce {
        msg_id: 0xDEAD_BEEF,
        ttl: 5,
        data_type: 7,
        payload: vec![0u8; 256],
    };
    c.bench_function("peer_announce_encode", |b| {
        b.iter(|| black_box(msg.encode()));
    });

    let frame = msg.encode();
    c.bench_function("peer_announce_parse", |b| {
        b.iter(|| black_box(Message::parse(&frame).unwrap()));
    });
}

fn offer_nonce_search(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let addrs = vec!["1.2.3.4:9000".to_string()];
    c.bench_function("offer_nonce_search_16_bits", |b| {
        b.iter(|| {
            rt.block_on(async {
                let (_tx, rx) = watch::channel(false);
                black_box(pow::produce_offer_nonce(42, &addrs, rx).await)
            })
        });
    });
}

criterion_group!(benches, codec_roundtrip, offer_nonce_search);
criterion_main!(benches);
