//! Integration tests for pull sequences.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use tidepool::{CancellationToken, Pull, SeqError, SortSpec};

fn token() -> CancellationToken {
    CancellationToken::none()
}

#[derive(Clone, Debug, PartialEq)]
struct Order {
    id: u32,
    customer: &'static str,
    total: u32,
}

#[derive(Clone, Debug, PartialEq)]
struct Customer {
    name: &'static str,
    city: &'static str,
}

fn orders() -> Pull<Order> {
    Pull::from_vec(vec![
        Order { id: 1, customer: "ada", total: 30 },
        Order { id: 2, customer: "bob", total: 10 },
        Order { id: 3, customer: "ada", total: 20 },
        Order { id: 4, customer: "cyd", total: 50 },
        Order { id: 5, customer: "bob", total: 10 },
    ])
}

fn customers() -> Pull<Customer> {
    Pull::from_vec(vec![
        Customer { name: "ada", city: "Oslo" },
        Customer { name: "bob", city: "Lima" },
        Customer { name: "eve", city: "Kyiv" },
    ])
}

// --- Realistic Pipelines ---

#[test]
fn test_report_pipeline() {
    // Totals per customer, largest first, ties by name.
    let report = orders()
        .group_by(|o| o.customer)
        .map(|g| (*g.key(), g.iter().map(|o| o.total).sum::<u32>()))
        .order_by_desc(|row| row.1)
        .then_by(|row| row.0)
        .to_vec(&token())
        .unwrap();

    assert_eq!(report, vec![("ada", 50), ("cyd", 50), ("bob", 20)]);
}

#[test]
fn test_join_and_group_join() {
    let joined = orders()
        .join(&customers(), |o| o.customer, |c| c.name, |o, c| (o.id, c.city))
        .to_vec(&token())
        .unwrap();
    assert_eq!(
        joined,
        vec![(1, "Oslo"), (2, "Lima"), (3, "Oslo"), (5, "Lima")]
    );

    let per_customer = customers()
        .group_join(&orders(), |c| c.name, |o| o.customer, |c, g| (c.name, g.len()))
        .to_vec(&token())
        .unwrap();
    assert_eq!(per_customer, vec![("ada", 2), ("bob", 2), ("eve", 0)]);
}

#[test]
fn test_generator_feeding_operators() {
    let fib = Pull::generate(|y, _| {
        let (mut a, mut b) = (0u64, 1u64);
        loop {
            y.emit(a)?;
            let next = a + b;
            a = b;
            b = next;
        }
    });

    let evens = fib.filter(|n| n % 2 == 0).take(5).to_vec(&token()).unwrap();
    assert_eq!(evens, vec![0, 2, 8, 34, 144]);
}

#[test]
fn test_flat_map_and_enumerate() {
    let expanded = Pull::range(1, 3)
        .flat_map(|n| Ok(Pull::repeat(*n, *n as usize)))
        .enumerate()
        .to_vec(&token())
        .unwrap();
    assert_eq!(
        expanded,
        vec![(0, 1), (1, 2), (2, 2), (3, 3), (4, 3), (5, 3)]
    );
}

#[test]
fn test_set_operators() {
    let a = Pull::from_vec(vec![1, 2, 2, 3, 4]);
    let b = Pull::from_vec(vec![3, 4, 5]);
    assert_eq!(a.union(&b).to_vec(&token()).unwrap(), vec![1, 2, 3, 4, 5]);
    assert_eq!(a.intersect(&b).to_vec(&token()).unwrap(), vec![3, 4]);
    assert_eq!(a.except(&b).to_vec(&token()).unwrap(), vec![1, 2]);
}

#[test]
fn test_custom_sort_spec() {
    let spec = SortSpec::by(|o: &Order| o.total).then_by_desc(|o: &Order| o.id);
    let ids: Vec<u32> = orders()
        .order_with(spec)
        .to_vec(&token())
        .unwrap()
        .iter()
        .map(|o| o.id)
        .collect();
    assert_eq!(ids, vec![5, 2, 3, 1, 4]);
}

// --- Independence and Laziness ---

#[test]
fn test_sessions_are_independent_across_threads() {
    let source = Pull::generate(|y, _| {
        for i in 0..200i64 {
            y.emit(i)?;
        }
        Ok(())
    })
    .map(|x| x * 3);

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let source = source.clone();
            thread::spawn(move || source.fold(0, |acc, x| Ok(acc + *x), &token()).unwrap())
        })
        .collect();

    let expected: i64 = (0..200i64).map(|x| x * 3).sum();
    for handle in handles {
        assert_eq!(handle.join().unwrap(), expected);
    }
}

#[test]
fn test_interleaved_sessions_do_not_share_position() {
    let source = Pull::range(0, 3);
    let mut a = source.session();
    let mut b = source.session();
    let t = token();

    assert!(a.advance(&t).unwrap());
    assert!(a.advance(&t).unwrap());
    assert!(b.advance(&t).unwrap());
    assert_eq!(*a.current().unwrap(), 1);
    assert_eq!(*b.current().unwrap(), 0);
}

#[test]
fn test_defer_runs_factory_per_session() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let source = Pull::defer(move || {
        let n = counter.fetch_add(1, Ordering::SeqCst);
        Ok(Pull::from_vec(vec![n]))
    });

    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(source.to_vec(&token()).unwrap(), vec![0]);
    assert_eq!(source.to_vec(&token()).unwrap(), vec![1]);
}

// --- Faults ---

#[test]
fn test_fault_mid_pipeline_keeps_delivered_elements() {
    let source = Pull::from_vec(vec![1, 2, 3, 4]).try_map(|x| {
        if *x == 3 {
            Err(SeqError::msg("bad row"))
        } else {
            Ok(*x)
        }
    });

    let mut session = source.session();
    let t = token();
    let mut seen = Vec::new();
    let err = loop {
        match session.advance(&t) {
            Ok(true) => seen.push(*session.current().unwrap()),
            Ok(false) => panic!("expected a fault"),
            Err(e) => break e,
        }
    };
    assert_eq!(seen, vec![1, 2]);
    assert!(err.to_string().contains("bad row"));

    let recovered = source
        .catch(|_| Ok(Pull::from_vec(vec![-1])))
        .to_vec(&t)
        .unwrap();
    assert_eq!(recovered, vec![1, 2, -1]);
}

#[test]
fn test_aggregate_contract_errors() {
    let t = token();
    assert!(matches!(Pull::<i32>::empty().first(&t), Err(SeqError::EmptySequence)));
    assert!(matches!(
        Pull::range(0, 2).single(&t),
        Err(SeqError::MoreThanOneElement)
    ));
    assert!(matches!(
        Pull::range(0, 2).element_at(5, &t),
        Err(SeqError::IndexOutOfRange { index: 5, len: 2 })
    ));
    assert_eq!(Pull::<i32>::empty().default_if_empty(9).single(&t).unwrap(), 9);
}

#[test]
fn test_buffer_replays_one_walk() {
    let walks = Arc::new(AtomicUsize::new(0));
    let counter = walks.clone();
    let source = Pull::generate(move |y, _| {
        counter.fetch_add(1, Ordering::SeqCst);
        y.emit_all(vec!['a', 'b', 'c'])
    });

    let buffer = source.buffer(&token()).unwrap();
    assert!(buffer.is_sealed());
    let replay = buffer.replay();
    assert_eq!(replay.to_vec(&token()).unwrap(), vec!['a', 'b', 'c']);
    assert_eq!(replay.to_vec(&token()).unwrap(), vec!['a', 'b', 'c']);
    assert_eq!(walks.load(Ordering::SeqCst), 1);
}
