use criterion::{black_box, criterion_group, criterion_main, Criterion};
use termpod::archive::{Archive, EntryMetadata};
use termpod::codec::{Codec, CompressionPolicy, DeflateCodec};
use termpod::format::FormatTag;

fn bench_deflate(c: &mut Criterion) {
    let data = b"terrain tile ".repeat(80 * 1024);
    let codec = DeflateCodec;
    let packed = codec.compress(&data, 8).unwrap();

    c.bench_function("deflate_compress_1mb", |b| b.iter(|| codec.compress(black_box(&data), 8)));
    c.bench_function("deflate_decompress_1mb", |b| {
        b.iter(|| codec.decompress(black_box(&packed), data.len()))
    });
}

fn bench_pack(c: &mut Criterion) {
    let data = vec![42u8; 64 * 1024];
    let meta = EntryMetadata::default();

    c.bench_function("pack_pod3_64x64k", |b| {
        b.iter(|| {
            let mut ar = Archive::create_empty(FormatTag::Pod3);
            for i in 0..64 {
                ar.add_entry(format!("tiles\\{i}.raw").as_bytes(), black_box(&data), &meta).unwrap();
            }
            ar.to_bytes().unwrap()
        })
    });

    c.bench_function("pack_pod4_auto_64x64k", |b| {
        let meta = meta.with_compression(CompressionPolicy::Auto);
        b.iter(|| {
            let mut ar = Archive::create_empty(FormatTag::Pod4);
            for i in 0..64 {
                ar.add_entry(format!("tiles\\{i}.raw").as_bytes(), black_box(&data), &meta).unwrap();
            }
            ar.to_bytes().unwrap()
        })
    });
}

fn bench_open(c: &mut Criterion) {
    let mut ar = Archive::create_empty(FormatTag::Pod2);
    for i in 0..2000 {
        ar.add_entry(format!("objects\\{i:04}.obj").as_bytes(), &[i as u8; 100], &EntryMetadata::default())
            .unwrap();
    }
    let image = ar.to_bytes().unwrap();

    c.bench_function("open_pod2_2000_entries", |b| {
        b.iter(|| Archive::from_bytes(black_box(image.clone()), None).unwrap())
    });
}

criterion_group!(benches, bench_deflate, bench_pack, bench_open);
criterion_main!(benches);
