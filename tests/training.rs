mod common;

use std::{env, fs};

use common::{dims, feature, hyper, init_logger};
use neural_labeler::{
    Feature, Labeler,
    config::{TopologyConfig, Variant},
    optimization::GradientDescent,
    params::Gradients,
};

fn labeler(variant: Variant, drop_prob: f32) -> Labeler {
    init_logger();

    let mut hyper = hyper(2, 6);
    hyper.drop_prob = drop_prob;
    Labeler::new(TopologyConfig::derive(variant, hyper, dims(4)).unwrap()).unwrap()
}

fn batch() -> Vec<(Feature, usize)> {
    (0..12)
        .map(|i| {
            let words: Vec<_> = (0..2 + i % 5).map(|j| (i * 3 + j) % 16).collect();
            let chars: Vec<_> = (0..1 + i % 4).map(|j| (i + j) % 10).collect();
            (feature(&words, &chars), i % 3)
        })
        .collect()
}

#[test]
fn parallel_gradients_match_sequential_ones() {
    let labeler = labeler(Variant::BiGrnnMlChar, 0.3);
    let examples = batch();
    let (parallel, parallel_loss) = labeler.compute_gradients(&examples).unwrap();

    let store = labeler.handle().read();
    let mut graph = labeler.graph().unwrap();
    let mut sequential = Gradients::new(store.layout().clone());
    let mut sequential_loss = 0.;
    let seed = labeler.config().hyper().seed.unwrap();

    for (i, (example, gold)) in examples.iter().enumerate() {
        graph.reseed(seed.wrapping_add(i as u64));
        graph.forward(&store, example, true).unwrap();
        sequential_loss += graph.backward(&store, *gold, &mut sequential).unwrap();
    }

    assert!((parallel_loss - sequential_loss).abs() < 1e-4 * sequential_loss.abs().max(1.));
    for (p, s) in parallel.as_slice().iter().zip(sequential.as_slice()) {
        assert!((p - s).abs() < 1e-4, "{p} != {s}");
    }
}

#[test]
fn gradient_descent_lowers_the_loss() {
    for variant in [Variant::CnnMlChar, Variant::RnnMl, Variant::BiGrnnChar] {
        let labeler = labeler(variant, 0.);
        let examples = batch();
        let mut optimizer = GradientDescent::new(0.1);

        let first = labeler.train_batch(&mut optimizer, &examples).unwrap();
        let mut last = first;
        for _ in 0..20 {
            last = labeler.train_batch(&mut optimizer, &examples).unwrap();
        }

        assert!(last < first, "{variant:?}: {last} >= {first}");
    }
}

#[test]
fn predictions_survive_save_and_load() {
    let labeler = labeler(Variant::CnnChar, 0.);
    let features: Vec<_> = batch().into_iter().map(|(f, _)| f).collect();
    let path = env::temp_dir().join(format!("neural_labeler_{}.model", std::process::id()));

    labeler.save(&path).unwrap();
    let loaded = Labeler::load(&path).unwrap();
    fs::remove_file(&path).unwrap();

    assert_eq!(
        labeler.predict_batch(&features).unwrap(),
        loaded.predict_batch(&features).unwrap()
    );
}

#[test]
fn empty_batch_is_a_no_op() {
    let labeler = labeler(Variant::CnnMl, 0.);
    let before = labeler.handle().snapshot();

    let loss = labeler
        .train_batch(&mut GradientDescent::new(1.), &[])
        .unwrap();
    assert_eq!(loss, 0.);
    assert_eq!(labeler.handle().snapshot().as_slice(), before.as_slice());
}
