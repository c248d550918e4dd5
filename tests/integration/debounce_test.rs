use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::FutureExt;

use purchasekit::services::debounce::DebouncedProcessor;

fn collecting_processor(
    identity: impl Fn(&u32) -> String + Send + Sync + 'static,
) -> (DebouncedProcessor<u32>, Arc<Mutex<Vec<u32>>>) {
    let processed = Arc::new(Mutex::new(Vec::new()));
    let sink = processed.clone();
    let processor = DebouncedProcessor::new(identity, move |item| {
        let sink = sink.clone();
        async move {
            sink.lock().unwrap().push(item);
        }
        .boxed()
    });
    (processor, processed)
}

#[tokio::test(start_paused = true)]
async fn duplicate_identities_collapse_to_the_first_item() {
    let (processor, processed) = collecting_processor(|_| "same".to_string());

    processor.add(1);
    processor.add(2);
    processor.add(3);

    tokio::time::sleep(Duration::from_millis(400)).await;

    // The first queued item wins; later duplicates are dropped, not
    // replacements.
    assert_eq!(*processed.lock().unwrap(), vec![1]);
}

#[tokio::test(start_paused = true)]
async fn distinct_identities_all_survive_in_order() {
    let (processor, processed) = collecting_processor(|item| item.to_string());

    processor.add(1);
    processor.add(2);
    processor.add(1);
    processor.add(3);

    tokio::time::sleep(Duration::from_millis(400)).await;

    assert_eq!(*processed.lock().unwrap(), vec![1, 2, 3]);
}

#[tokio::test(start_paused = true)]
async fn nothing_is_processed_before_the_window_elapses() {
    let (processor, processed) = collecting_processor(|item| item.to_string());

    processor.add(1);
    tokio::time::sleep(Duration::from_millis(250)).await;
    assert!(processed.lock().unwrap().is_empty());

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(*processed.lock().unwrap(), vec![1]);
}

#[tokio::test(start_paused = true)]
async fn items_added_after_a_flush_start_a_new_batch() {
    let (processor, processed) = collecting_processor(|item| item.to_string());

    processor.add(1);
    tokio::time::sleep(Duration::from_millis(400)).await;
    processor.add(2);
    tokio::time::sleep(Duration::from_millis(400)).await;

    assert_eq!(*processed.lock().unwrap(), vec![1, 2]);
}

#[tokio::test(start_paused = true)]
async fn cleanup_drops_the_queue_unprocessed() {
    let (processor, processed) = collecting_processor(|item| item.to_string());

    processor.add(1);
    processor.cleanup();
    tokio::time::sleep(Duration::from_millis(400)).await;

    assert!(processed.lock().unwrap().is_empty());
}
