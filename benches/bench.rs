//! Benchmarks for nlg-decode components.

use nlg_decode::{
    greedy_generate, nucleus_generate, top_k_top_p_filtering, DecodeInputs, Features,
    NucleusParams, Result, Scorer, SeededSampler, StepOutput, FILTER_VALUE,
};
use tch::{Device, Kind, Tensor};

use criterion::{criterion_group, criterion_main, Criterion};

const VOCAB: i64 = 32_000;

/// Random scores for every step; never emits an end token on purpose.
struct RandomScorer;

impl Scorer for RandomScorer {
    type Cache = ();

    fn step(
        &mut self,
        input_ids: &Tensor,
        _decoder_input_ids: Option<&Tensor>,
        _past: Option<StepOutput<()>>,
        _features: &Features,
    ) -> Result<StepOutput<()>> {
        let batch_size = input_ids.size()[0];
        Ok(StepOutput::new(Tensor::randn(
            [batch_size, VOCAB],
            (Kind::Float, Device::Cpu),
        )))
    }
}

/// Benchmark top-k/top-p filtering of a vocabulary-sized batch.
fn bench_filtering_cpu(c: &mut Criterion) {
    let scores = Tensor::randn([16, VOCAB], (Kind::Float, Device::Cpu));

    c.bench_function("top_k_top_p_filtering", |b| {
        b.iter(|| top_k_top_p_filtering(&scores, 50, 0.9, FILTER_VALUE))
    });
    c.bench_function("top_p_filtering", |b| {
        b.iter(|| top_k_top_p_filtering(&scores, 0, 0.9, FILTER_VALUE))
    });
}

/// Benchmark full decoding loops; the scorer is cheap so this measures the loop itself.
fn bench_decode_loop(c: &mut Criterion) {
    let features = Features::new();
    let input_ids = Tensor::ones([8, 4], (Kind::Int64, Device::Cpu));
    let inputs = DecodeInputs::new(&input_ids, &features, -1, 32);
    let params = NucleusParams {
        temperature: 0.8,
        top_k: 50,
        top_p: 0.9,
    };

    c.bench_function("nucleus_generate", |b| {
        let mut sampler = SeededSampler::new(0);
        b.iter(|| nucleus_generate(&inputs, &params, &mut RandomScorer, &mut sampler))
    });
    c.bench_function("greedy_generate", |b| {
        let mut sampler = SeededSampler::new(0);
        b.iter(|| greedy_generate(&inputs, &mut RandomScorer, &mut sampler))
    });
}

criterion_group!(
    name = benches;
    config = Criterion::default().sample_size(10);
    targets =
        bench_filtering_cpu,
        bench_decode_loop,
);
criterion_main!(benches);
