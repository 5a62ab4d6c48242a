//! Several server nodes over one shared backend

mod support;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use lwm2m_registry::observation::{NotificationRequest, NotificationResponse, ResponseCode};
use lwm2m_registry::server::{Server, StoreKind};
use lwm2m_registry::store::{MemoryBackend, StoreConfig};
use lwm2m_registry::{
    RegistrationId, RegistrationStore, ServerBuilder, ServerConfig, SharedRegistrationStore, Token,
};

use support::{LifecycleRecorder, ObservationEvent, ObservationRecorder};

async fn node(backend: &Arc<MemoryBackend>) -> Server {
    ServerBuilder::new(ServerConfig::default().store(StoreKind::SharedMemory))
        .decoder(support::decoder())
        .shared_backend(Arc::clone(backend))
        .build()
        .await
        .unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_registration_same_endpoint() {
    support::init_tracing();
    let backend = Arc::new(MemoryBackend::new());
    let nodes = [
        SharedRegistrationStore::new(Arc::clone(&backend)),
        SharedRegistrationStore::new(Arc::clone(&backend)),
    ];

    let mut tasks = Vec::new();
    for i in 0..8 {
        let store = Arc::clone(&nodes[i % 2]);
        tasks.push(tokio::spawn(async move {
            let reg = support::registration(&format!("r{}", i), "dev-1", 60);
            store.add_registration(reg).await
        }));
    }

    let mut fresh = 0;
    let mut evicted = Vec::new();
    for task in tasks {
        match task.await.unwrap().unwrap() {
            None => fresh += 1,
            Some(previous) => evicted.push(previous.registration.id),
        }
    }

    // one total order: a single first writer, every other record evicted once
    assert_eq!(fresh, 1);
    assert_eq!(evicted.len(), 7);
    let evicted: HashSet<RegistrationId> = evicted.into_iter().collect();
    assert_eq!(evicted.len(), 7);

    let survivor = nodes[0]
        .get_registration_by_endpoint("dev-1")
        .await
        .unwrap()
        .unwrap();
    assert!(!evicted.contains(&survivor.id));
    assert_eq!(nodes[1].all_registrations().await.unwrap(), vec![survivor]);
}

#[tokio::test]
async fn test_state_visible_across_nodes() {
    let backend = Arc::new(MemoryBackend::new());
    let a = node(&backend).await;
    let b = node(&backend).await;
    let recorder_b = Arc::new(ObservationRecorder::default());
    b.observations().add_listener(recorder_b.clone());

    a.clients()
        .register_client(support::registration("r1", "dev-1", 60))
        .await
        .unwrap();
    a.observations()
        .add_observation(support::observation(b"T1", "r1", "/3/0/1"))
        .await
        .unwrap();

    let reg = b.clients().get("dev-1").await.unwrap().unwrap();
    assert_eq!(b.observations().get_observations(&reg).await.unwrap().len(), 1);

    // a notification may arrive on a node that did not create the observation
    let request = NotificationRequest::for_registration(&reg.id);
    let response = NotificationResponse::new(ResponseCode::Content, Token::from_static(b"T1"), "3");
    b.observations().on_notification(&request, &response).await.unwrap();
    assert_eq!(
        recorder_b.events(),
        vec![ObservationEvent::Value(
            Token::from_static(b"T1"),
            Some(lwm2m_registry::model::Value::Integer(3))
        )]
    );

    // superseding on the other node
    b.observations()
        .add_observation(support::observation(b"T2", "r1", "/3/0/1"))
        .await
        .unwrap();
    let live: Vec<Token> = a
        .observations()
        .get_observations(&reg)
        .await
        .unwrap()
        .into_iter()
        .map(|o| o.id)
        .collect();
    assert_eq!(live, vec![Token::from_static(b"T2")]);
    assert_eq!(recorder_b.cancelled(), vec![Token::from_static(b"T1")]);
}

#[tokio::test]
async fn test_deregistration_on_other_node() {
    let backend = Arc::new(MemoryBackend::new());
    let a = node(&backend).await;
    let b = node(&backend).await;
    let lifecycle_a = Arc::new(LifecycleRecorder::default());
    let lifecycle_b = Arc::new(LifecycleRecorder::default());
    a.clients().add_listener(lifecycle_a.clone());
    b.clients().add_listener(lifecycle_b.clone());

    a.clients()
        .register_client(support::registration("r1", "dev-1", 60))
        .await
        .unwrap();

    let id = RegistrationId::new("r1");
    let removed = b.clients().deregister_client(&id).await.unwrap();
    assert_eq!(removed.registration.endpoint, "dev-1");
    assert!(a.clients().deregister_client(&id).await.is_err());

    assert_eq!(lifecycle_a.unregistered(), Vec::<RegistrationId>::new());
    assert_eq!(lifecycle_b.unregistered(), vec![id]);
    assert!(backend.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_expiry_claimed_by_one_node() {
    let backend = Arc::new(MemoryBackend::new());
    let config = StoreConfig::default().cleanup_interval(Duration::from_secs(3600));
    let nodes: Vec<_> = (0..3)
        .map(|_| SharedRegistrationStore::with_config(Arc::clone(&backend), config.clone()))
        .collect();

    for i in 0..5 {
        let mut reg = support::registration(&format!("r{}", i), &format!("dev-{}", i), 60);
        reg.last_update = SystemTime::now() - Duration::from_secs(61);
        nodes[0].add_registration(reg).await.unwrap();
    }

    let now = SystemTime::now();
    let mut tasks = Vec::new();
    for store in &nodes {
        let store = Arc::clone(store);
        tasks.push(tokio::spawn(async move { store.sweep_expired(now).await }));
    }

    let mut removed = 0;
    for task in tasks {
        removed += task.await.unwrap().unwrap();
    }
    assert_eq!(removed, 5);
    assert!(backend.is_empty());
}
