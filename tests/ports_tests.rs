use forge_scan::ports::{load_ports_from_path, parse_port_spec, top_ports};
use std::io::Write;

#[test]
fn reversed_range_is_normalized() {
    let parsed = parse_port_spec("25-20");
    assert_eq!(parsed.ports.as_slice(), &[20, 21, 22, 23, 24, 25]);
    assert_eq!(parsed.dropped, 0);
}

#[test]
fn duplicates_and_overlaps_collapse_sorted() {
    let parsed = parse_port_spec("80,22,80,22-24");
    assert_eq!(parsed.ports.as_slice(), &[22, 23, 24, 80]);
}

#[test]
fn invalid_tokens_are_dropped_not_fatal() {
    let parsed = parse_port_spec("80,99999,abc,443");
    assert_eq!(parsed.ports.as_slice(), &[80, 443]);
    assert_eq!(parsed.dropped, 2);
}

#[test]
fn empty_spec_yields_empty_set() {
    let parsed = parse_port_spec("");
    assert!(parsed.ports.is_empty());
    assert_eq!(parsed.dropped, 0);

    let parsed = parse_port_spec("nope,0,70000");
    assert!(parsed.ports.is_empty());
    assert_eq!(parsed.dropped, 3);
}

#[test]
fn canonical_form_parses_back_to_same_set() {
    for spec in ["22,80,8000-8100", "65535,1,2,3,1024-1030,7", "443"] {
        let first = parse_port_spec(spec).ports;
        let again = parse_port_spec(&first.to_spec_string());
        assert_eq!(again.ports, first, "spec {spec}");
        assert_eq!(again.dropped, 0);
    }
    let top = top_ports();
    assert_eq!(parse_port_spec(&top.to_spec_string()).ports, top);
}

#[test]
fn ports_file_loads_from_disk() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "# web").unwrap();
    writeln!(file, "443 # https").unwrap();
    writeln!(file, "80").unwrap();
    writeln!(file, "8001-8000").unwrap();
    writeln!(file, "http").unwrap();

    let parsed = load_ports_from_path(file.path()).expect("load ok");
    assert_eq!(parsed.ports.as_slice(), &[80, 443, 8000, 8001]);
    assert_eq!(parsed.dropped, 1);
}

#[test]
fn missing_ports_file_is_error() {
    assert!(load_ports_from_path("/nonexistent/forge-scan/ports.txt").is_err());
}
