use criterion::{criterion_group, criterion_main, Bencher, BenchmarkId, Criterion};

use binorbit::convolve::Convolver;
use binorbit::dataset::{Dataset, Direction, ImpulseResponse};
use binorbit::pcm::AudioBuffer;
use binorbit::render::Renderer;

use rand::Rng;

const SAMPLE_RATE: u32 = 44100;

/// Random filters every 5 degrees on the horizontal plane
struct Circle {
    filters: Vec<ImpulseResponse>,
}

impl Circle {
    fn new(filt_len: usize) -> Self {
        let mut rng = rand::thread_rng();

        let filters = (0..72)
            .map(|_| {
                let mut left = vec![0.0f32; filt_len];
                let mut right = vec![0.0f32; filt_len];

                rng.fill(left.as_mut_slice());
                rng.fill(right.as_mut_slice());

                ImpulseResponse::new(left, right)
            })
            .collect();

        Self { filters }
    }
}

impl Dataset for Circle {
    fn sample_rate(&self) -> u32 {
        SAMPLE_RATE
    }

    fn filter_len(&self) -> usize {
        self.filters[0].len()
    }

    fn len(&self) -> usize {
        self.filters.len()
    }

    fn nearest(&self, direction: Direction) -> usize {
        ((direction.azimuth / 5.0).round() as usize).min(self.filters.len() - 1)
    }

    fn response(&self, index: usize) -> &ImpulseResponse {
        &self.filters[index]
    }

    fn direction(&self, index: usize) -> Direction {
        Direction::azimuth(index as f32 * 5.0)
    }
}

fn bench_convolver(b: &mut Bencher, block_len: usize, filt_len: usize) {
    let mut convolver = Convolver::new(block_len, filt_len);
    let filter = convolver.transform(&Circle::new(filt_len).filters[0]).unwrap();

    let mut input = vec![0.0; block_len];
    let mut left = vec![0.0; convolver.output_len(block_len)];
    let mut right = vec![0.0; convolver.output_len(block_len)];

    rand::thread_rng().fill(input.as_mut_slice());

    b.iter(|| convolver.process(&input, &filter, &mut left, &mut right));
}

fn bench_render(b: &mut Bencher, seconds: usize, filt_len: usize) {
    let hrirs = Circle::new(filt_len);

    let mut samples = vec![0.0; seconds * SAMPLE_RATE as usize];
    rand::thread_rng().fill(samples.as_mut_slice());

    let audio = AudioBuffer::new(samples, SAMPLE_RATE);
    let renderer = Renderer::builder().build().unwrap();

    b.iter(|| renderer.render(&audio, &hrirs));
}

fn bench_filter_len(c: &mut Criterion) {
    let mut group = c.benchmark_group("Filter Lengths");
    for i in [8, 16, 32, 64, 128, 256, 512, 1024, 4096].iter() {
        group.bench_with_input(BenchmarkId::new("length", i), i, |b, i| {
            bench_convolver(b, 4410, *i)
        });
    }
    group.finish();
}

fn bench_block_len(c: &mut Criterion) {
    let mut group = c.benchmark_group("Block Lengths");
    for i in [441, 882, 2205, 4410, 8820, 22050].iter() {
        group.bench_with_input(BenchmarkId::new("length", i), i, |b, i| {
            bench_convolver(b, *i, 512)
        });
    }
    group.finish();
}

fn bench_render_len(c: &mut Criterion) {
    let mut group = c.benchmark_group("Render Seconds");
    group.sample_size(10);
    for i in [1, 10, 30].iter() {
        group.bench_with_input(BenchmarkId::new("seconds", i), i, |b, i| {
            bench_render(b, *i, 512)
        });
    }
    group.finish();
}

criterion_group!(benches, bench_block_len, bench_filter_len, bench_render_len);
criterion_main!(benches);
