//! Pipeline ordering guarantees under concurrent producers.

use std::sync::Arc;

use minder::pipeline::EventQueue;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Tagged {
    producer: usize,
    sequence: usize,
}

#[tokio::test]
async fn per_producer_order_survives_interleaving() {
    let queue = Arc::new(EventQueue::new(1024));
    const PER_PRODUCER: usize = 200;

    let mut producers = Vec::new();
    for producer in 0..4 {
        let queue = Arc::clone(&queue);
        producers.push(tokio::spawn(async move {
            for sequence in 0..PER_PRODUCER {
                queue.append(Tagged { producer, sequence }).await;
            }
        }));
    }
    for producer in producers {
        producer.await.unwrap();
    }

    let mut next_expected = [0usize; 4];
    for _ in 0..4 * PER_PRODUCER {
        let item = queue.get().await;
        assert_eq!(
            item.sequence, next_expected[item.producer],
            "producer {} items arrived out of order",
            item.producer
        );
        next_expected[item.producer] += 1;
    }
    assert!(queue.is_empty());
}

#[tokio::test]
async fn batches_are_never_interleaved() {
    let queue = Arc::new(EventQueue::new(2048));
    const BATCHES: usize = 50;
    const BATCH_LEN: usize = 8;

    let mut producers = Vec::new();
    for producer in 0..3 {
        let queue = Arc::clone(&queue);
        producers.push(tokio::spawn(async move {
            for _ in 0..BATCHES {
                let batch: Vec<Tagged> = (0..BATCH_LEN)
                    .map(|sequence| Tagged { producer, sequence })
                    .collect();
                queue.append_list(batch).await;
            }
        }));
    }
    for producer in producers {
        producer.await.unwrap();
    }

    // every batch must come out whole: a full run of one producer's
    // sequence numbers before any other producer appears
    for _ in 0..3 * BATCHES {
        let head = queue.get().await;
        assert_eq!(head.sequence, 0);
        for sequence in 1..BATCH_LEN {
            let item = queue.get().await;
            assert_eq!(item.producer, head.producer, "batch was interleaved");
            assert_eq!(item.sequence, sequence);
        }
    }
    assert!(queue.is_empty());
}
