mod common;

use common::{Fixture, feature};
use neural_labeler::{config::Variant, params::Gradients};

#[test]
fn reused_graph_matches_a_fresh_one() {
    let long = feature(&[1, 2, 3, 4, 5, 6, 7, 8], &[1, 2, 3, 4, 5, 6, 7]);
    let short = feature(&[9, 3], &[8]);

    for variant in Variant::ALL {
        let mut fx = Fixture::small(variant);

        for (first, second) in [(&long, &short), (&short, &long)] {
            fx.graph.forward(&fx.store, first, false).unwrap();
            let reused = fx.graph.forward(&fx.store, second, false).unwrap().to_owned();
            let expected = fx
                .fresh_graph()
                .forward(&fx.store, second, false)
                .unwrap()
                .to_owned();

            assert_eq!(reused, expected, "{variant:?}");
            assert_eq!(fx.graph.word_len(), second.words.len());
        }
    }
}

#[test]
fn reused_graph_backpropagates_like_a_fresh_one() {
    let long = feature(&[4, 4, 2, 8, 1, 3], &[3, 1, 4, 1, 5]);
    let short = feature(&[7, 5, 11], &[2, 9]);

    for variant in Variant::ALL {
        let mut fx = Fixture::small(variant);
        let mut fresh = fx.fresh_graph();
        let layout = fx.store.layout().clone();

        fx.graph.forward(&fx.store, &long, true).unwrap();
        fx.graph
            .backward(&fx.store, 2, &mut Gradients::new(layout.clone()))
            .unwrap();

        let mut reused = Gradients::new(layout.clone());
        fx.graph.reseed(3);
        fx.graph.forward(&fx.store, &short, true).unwrap();
        let reused_loss = fx.graph.backward(&fx.store, 1, &mut reused).unwrap();

        let mut expected = Gradients::new(layout);
        fresh.reseed(3);
        fresh.forward(&fx.store, &short, true).unwrap();
        let expected_loss = fresh.backward(&fx.store, 1, &mut expected).unwrap();

        assert_eq!(reused_loss, expected_loss, "{variant:?}");
        assert_eq!(reused.as_slice(), expected.as_slice(), "{variant:?}");
    }
}

#[test]
fn dropout_is_off_outside_training() {
    let mut hyper = common::hyper(2, 4);
    hyper.drop_prob = 0.5;
    let mut fx = Fixture::new(Variant::BiGrnnMlChar, hyper, common::dims(3));
    let example = feature(&[1, 2, 3], &[4, 5]);

    let first = fx.graph.forward(&fx.store, &example, false).unwrap().to_owned();
    let second = fx.graph.forward(&fx.store, &example, false).unwrap().to_owned();
    assert_eq!(first, second);

    let trained = fx.graph.forward(&fx.store, &example, true).unwrap().to_owned();
    assert_ne!(first, trained);
}

#[test]
fn truncation_keeps_the_prefix() {
    let mut hyper = common::hyper(1, 4);
    hyper.max_sentence_length = 3;
    hyper.max_char_length = 2;
    let mut fx = Fixture::new(Variant::CnnChar, hyper, common::dims(3));

    let truncated = fx
        .graph
        .forward(&fx.store, &feature(&[1, 2, 3, 4, 5], &[6, 7, 8]), false)
        .unwrap()
        .to_owned();
    assert_eq!(fx.graph.word_len(), 3);
    assert_eq!(fx.graph.char_len(), 2);

    let prefix = fx
        .graph
        .forward(&fx.store, &feature(&[1, 2, 3], &[6, 7]), false)
        .unwrap()
        .to_owned();
    assert_eq!(truncated, prefix);
}
