use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_roomschedd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn roomschedd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn request_err(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> String {
    let value = request(stdin, reader, id, method, params);
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(false),
        "{} unexpectedly succeeded: {}",
        method,
        value
    );
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
        .unwrap_or("unknown")
        .to_string()
}

fn catalog() -> serde_json::Value {
    json!({
        "rooms": [
            { "id": "A1", "name": "A1", "building": "A", "floor": 1, "capacity": 40 },
            { "id": "A2", "name": "A2", "building": "A", "floor": 1, "capacity": 30, "equipment": ["projector"] },
            { "id": "A3", "name": "A3", "building": "A", "floor": 2, "capacity": 30 },
            { "id": "B1", "name": "B1", "building": "B", "floor": 1, "status": "unavailable" },
            { "id": "B2", "name": "B2", "building": "B", "floor": 1 }
        ],
        "classes": [
            { "id": "X", "name": "Algorithms", "code": "INF-101", "degree": "Informatics", "generation": "2023", "shift": "morning" },
            { "id": "Y", "name": "Databases", "code": "INF-201", "degree": "Informatics", "generation": "2024", "shift": "evening" },
            { "id": "Z", "name": "Statics", "code": "CIV-101", "degree": "Civil", "generation": "2023", "shift": "morning" },
            { "id": "W", "name": "Hydraulics", "code": "CIV-201", "degree": "Civil", "generation": "2024", "shift": "morning" }
        ]
    })
}

fn cell(day: &str, slot: &str, room: &str) -> serde_json::Value {
    let (building, floor) = match room {
        "A1" | "A2" => ("A", 1),
        "A3" => ("A", 2),
        _ => ("B", 1),
    };
    json!({
        "day": day,
        "timeSlot": slot,
        "building": building,
        "floor": floor,
        "roomId": room
    })
}

fn mon(room: &str) -> serde_json::Value {
    cell("Mon", "07:00-10:00", room)
}

fn open_inline(stdin: &mut ChildStdin, reader: &mut BufReader<ChildStdout>) -> serde_json::Value {
    let mut params = catalog();
    params["schedule"] = json!({
        "assignments": [
            { "cell": mon("A1"), "classId": "X" },
            { "cell": mon("A2"), "classId": "Y" }
        ]
    });
    request_ok(stdin, reader, "open", "session.open", params)
}

fn class_at(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    at: serde_json::Value,
) -> serde_json::Value {
    request_ok(stdin, reader, id, "grid.cell", json!({ "cell": at }))["classId"].clone()
}

#[test]
fn move_into_empty_cell_and_into_unavailable_room() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let opened = open_inline(&mut stdin, &mut reader);
    assert_eq!(opened["counts"]["assigned"], json!(2));
    assert_eq!(opened["counts"]["cells"], json!(100));
    assert_eq!(opened["dirty"], json!(false));

    let moved = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "grid.moveOrSwap",
        json!({ "origin": mon("A1"), "target": mon("A3") }),
    );
    assert_eq!(moved["outcome"], json!("moved"));
    assert_eq!(class_at(&mut stdin, &mut reader, "2", mon("A1")), json!(null));
    assert_eq!(class_at(&mut stdin, &mut reader, "3", mon("A3")), json!("X"));

    let code = request_err(
        &mut stdin,
        &mut reader,
        "4",
        "grid.moveOrSwap",
        json!({ "origin": mon("A3"), "target": mon("B1") }),
    );
    assert_eq!(code, "unavailable_room");
    assert_eq!(class_at(&mut stdin, &mut reader, "5", mon("A3")), json!("X"));

    let same = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "grid.moveOrSwap",
        json!({ "origin": mon("A3"), "target": mon("A3") }),
    );
    assert_eq!(same["outcome"], json!("unchanged"));

    let state = request_ok(&mut stdin, &mut reader, "7", "session.state", json!({}));
    assert_eq!(state["dirty"], json!(true));
    assert_eq!(state["revision"], json!(1));

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn swap_requires_confirmation_and_cancel_keeps_grid() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    open_inline(&mut stdin, &mut reader);

    let proposed = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "grid.moveOrSwap",
        json!({ "origin": mon("A1"), "target": mon("A2") }),
    );
    assert_eq!(proposed["outcome"], json!("swapProposed"));
    assert_eq!(proposed["proposal"]["from"]["classId"], json!("X"));
    assert_eq!(proposed["proposal"]["to"]["classId"], json!("Y"));
    // Nothing moves until confirmed.
    assert_eq!(class_at(&mut stdin, &mut reader, "2", mon("A1")), json!("X"));

    let code = request_err(
        &mut stdin,
        &mut reader,
        "3",
        "grid.placeNew",
        json!({ "classId": "Z", "cell": mon("B2") }),
    );
    assert_eq!(code, "swap_pending");

    let cancelled = request_ok(&mut stdin, &mut reader, "4", "swap.cancel", json!({}));
    assert_eq!(cancelled["cancelled"]["from"]["classId"], json!("X"));
    assert_eq!(class_at(&mut stdin, &mut reader, "5", mon("A1")), json!("X"));
    assert_eq!(class_at(&mut stdin, &mut reader, "6", mon("A2")), json!("Y"));
    let swap = request_ok(&mut stdin, &mut reader, "7", "swap.get", json!({}));
    assert_eq!(swap["open"], json!(false));

    let code = request_err(&mut stdin, &mut reader, "8", "swap.cancel", json!({}));
    assert_eq!(code, "no_proposal");

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn confirm_swaps_both_cells_and_checks_proposal_id() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    open_inline(&mut stdin, &mut reader);

    let proposed = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "grid.moveOrSwap",
        json!({ "origin": mon("A1"), "target": mon("A2") }),
    );
    let proposal_id = proposed["proposal"]["proposalId"]
        .as_str()
        .expect("proposalId")
        .to_string();

    let code = request_err(
        &mut stdin,
        &mut reader,
        "2",
        "swap.confirm",
        json!({ "proposalId": "00000000-0000-4000-8000-000000000000" }),
    );
    assert_eq!(code, "stale_proposal");
    let swap = request_ok(&mut stdin, &mut reader, "3", "swap.get", json!({}));
    assert_eq!(swap["open"], json!(true));

    let confirmed = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "swap.confirm",
        json!({ "proposalId": proposal_id }),
    );
    assert_eq!(confirmed["revision"], json!(1));
    assert_eq!(class_at(&mut stdin, &mut reader, "5", mon("A1")), json!("Y"));
    assert_eq!(class_at(&mut stdin, &mut reader, "6", mon("A2")), json!("X"));

    let snapshot = request_ok(&mut stdin, &mut reader, "7", "schedule.snapshot", json!({}));
    assert_eq!(snapshot["assignments"].as_array().map(|a| a.len()), Some(2));

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn place_new_rules_and_can_place_predicate() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    open_inline(&mut stdin, &mut reader);

    let check = |stdin: &mut ChildStdin,
                 reader: &mut BufReader<ChildStdout>,
                 id: &str,
                 params: serde_json::Value| {
        request_ok(stdin, reader, id, "grid.canPlace", params)
    };

    let free = check(&mut stdin, &mut reader, "1", json!({ "cell": mon("B2"), "classId": "Z" }));
    assert_eq!(free["canPlace"], json!(true));
    let occupied = check(&mut stdin, &mut reader, "2", json!({ "cell": mon("A1"), "classId": "Z" }));
    assert_eq!(occupied["reason"], json!("cell_occupied"));
    let closed = check(&mut stdin, &mut reader, "3", json!({ "cell": mon("B1"), "classId": "Z" }));
    assert_eq!(closed["reason"], json!("unavailable_room"));
    let placed = check(&mut stdin, &mut reader, "4", json!({ "cell": mon("B2"), "classId": "X" }));
    assert_eq!(placed["reason"], json!("already_placed"));
    let from_cell = check(
        &mut stdin,
        &mut reader,
        "5",
        json!({ "cell": mon("A2"), "origin": mon("A1") }),
    );
    assert_eq!(from_cell["canPlace"], json!(true));

    let code = request_err(
        &mut stdin,
        &mut reader,
        "6",
        "grid.placeNew",
        json!({ "classId": "Z", "cell": mon("A1") }),
    );
    assert_eq!(code, "cell_occupied");
    let code = request_err(
        &mut stdin,
        &mut reader,
        "7",
        "grid.placeNew",
        json!({ "classId": "Z", "cell": cell("Sun", "07:00-10:00", "A1") }),
    );
    assert_eq!(code, "unknown_cell");
    let code = request_err(
        &mut stdin,
        &mut reader,
        "8",
        "grid.placeNew",
        json!({ "classId": "Z", "cell": { "day": "Mon", "timeSlot": "07:00-10:00", "building": "B", "floor": 1, "roomId": "A1" } }),
    );
    assert_eq!(code, "unknown_cell");

    request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "grid.placeNew",
        json!({ "classId": "Z", "cell": cell("Tue", "13:00-16:00", "B2") }),
    );
    let pool = request_ok(&mut stdin, &mut reader, "10", "grid.unassigned", json!({}));
    let ids: Vec<&str> = pool["classes"]
        .as_array()
        .expect("classes")
        .iter()
        .filter_map(|c| c["id"].as_str())
        .collect();
    assert_eq!(ids, vec!["W"]);

    let removed = request_ok(
        &mut stdin,
        &mut reader,
        "11",
        "grid.unassign",
        json!({ "cell": mon("A1") }),
    );
    assert_eq!(removed["classId"], json!("X"));

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn invalid_inline_schedule_is_rejected() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let mut params = catalog();
    params["schedule"] = json!({
        "assignments": [
            { "cell": mon("A1"), "classId": "X" },
            { "cell": mon("A2"), "classId": "X" }
        ]
    });
    let code = request_err(&mut stdin, &mut reader, "1", "session.open", params);
    assert_eq!(code, "bad_snapshot");

    let mut params = catalog();
    params["schedule"] = json!({ "assignments": [ { "cell": mon("B1"), "classId": "X" } ] });
    let code = request_err(&mut stdin, &mut reader, "2", "session.open", params);
    assert_eq!(code, "bad_snapshot");

    drop(stdin);
    let _ = child.wait();
}
