//! 令牌游戏端到端测试：构网、发生、PNML 文件往返.
use std::path::PathBuf;

use yapne::config::NetConfig;
use yapne::net::io::{self, pnml};
use yapne::net::*;

fn scratch_file(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("yapne-{}-{name}", std::process::id()))
}

fn producer_consumer() -> PetriNet {
    let mut net = PetriNet::new();
    for (id, name, marking, x) in [
        ("p1", "P1", 2, 10),
        ("p2", "P2", 3, 10),
        ("p3", "P3", 6, 10),
        ("o1", "O1", 0, 90),
        ("o2", "O2", 0, 90),
    ] {
        let mut place = Place::with_marking(id, marking);
        place.node_mut().set_name(name);
        place.node_mut().set_position(Position::new(x, 20).unwrap());
        net.add_element(place).unwrap();
    }
    net.add_element(Transition::new("t")).unwrap();
    net.connect_from_nodes("t", &["p1", "p2", "p3"]).unwrap();
    net.connect_to_nodes("t", &["o1", "o2"]).unwrap();
    net
}

#[test]
fn three_inputs_two_outputs_scenario() {
    let mut net = producer_consumer();
    let order = ["p1", "p2", "p3", "o1", "o2"];
    let snapshot = |net: &PetriNet| order.map(|id| net.markings()[id]);

    assert!(net.occur("t").unwrap());
    assert_eq!(snapshot(&net), [1, 2, 5, 3, 3]);
    assert!(net.occur("t").unwrap());
    assert_eq!(snapshot(&net), [0, 1, 4, 6, 6]);
    assert!(!net.occur("t").unwrap());
    assert_eq!(snapshot(&net), [0, 1, 4, 6, 6]);
}

#[test]
fn pnml_file_round_trip_after_firing() {
    let mut net = producer_consumer();
    net.occur("t").unwrap();

    let path = scratch_file("round-trip.pnml");
    io::write_pnml(&path, &net).unwrap();
    let loaded = io::read_pnml(&path).unwrap();
    std::fs::remove_file(&path).unwrap();

    assert_eq!(
        loaded.ids().collect::<Vec<_>>(),
        net.ids().collect::<Vec<_>>()
    );
    for place in net.places() {
        let other = loaded.place(place.id()).unwrap();
        assert_eq!(other.marking(), place.marking());
        assert_eq!(other.node().name(), place.node().name());
        assert_eq!(other.node().position(), place.node().position());
    }
    assert_eq!(pnml::export_pnml(&loaded), net.to_pnml());
}

#[test]
fn configured_prefix_names_new_arcs_of_loaded_net() {
    let net = producer_consumer();
    let path = scratch_file("prefix.pnml");
    io::write_pnml(&path, &net).unwrap();

    let config = NetConfig {
        arc_id_prefix: "edge".to_owned(),
        ..NetConfig::default()
    };
    let mut loaded = io::read_pnml_with_config(&path, &config).unwrap();
    std::fs::remove_file(&path).unwrap();

    loaded.add_element(Transition::new("t2")).unwrap();
    assert_eq!(loaded.connect_to_node("o1", "t2").unwrap(), "edge0");
}

#[test]
fn removing_a_place_leaves_no_dangling_arcs() {
    let mut net = producer_consumer();
    net.remove_element("o1").unwrap();
    assert!(net.arcs().all(|arc| arc.target().is_some_and(|t| t != "o1")));
    assert_eq!(net.node("t").unwrap().output_arcs().len(), 1);

    let reparsed = pnml::import_pnml(&net.to_pnml()).unwrap();
    assert_eq!(reparsed.arcs().count(), 4);
}
