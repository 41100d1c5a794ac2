use super::*;

#[tokio::test]
async fn cat_round_trip_echoes_one_line() {
    let mut proc = Proc::spawn("cat", ["-"]).expect("spawn cat");
    proc.send_stdin("hello").await.expect("send stdin");
    proc.close_stdin();

    let line = proc.stdout.recv().await.expect("stdout line");
    assert_eq!(line, "hello");

    let result = proc.done.await.expect("done fired");
    assert!(result.is_ok());
}

#[tokio::test]
async fn cat_fan_in_preserves_order() {
    let mut proc = Proc::spawn("cat", ["-"]).expect("spawn cat");
    for i in 0..5 {
        proc.send_stdin(format!("line-{i}")).await.expect("send stdin");
    }
    proc.close_stdin();

    let mut received = Vec::new();
    while let Some(line) = proc.stdout.recv().await {
        received.push(line);
    }

    assert_eq!(
        received,
        vec!["line-0", "line-1", "line-2", "line-3", "line-4"]
    );
    assert!(proc.done.await.expect("done fired").is_ok());
}

#[tokio::test]
async fn nonzero_exit_surfaces_as_remote_exit() {
    let mut proc = Proc::spawn("sh", ["-c", "exit 3"]).expect("spawn sh");
    proc.close_stdin();

    let result = proc.done.await.expect("done fired");
    match result {
        Err(JudoError::RemoteExit { status }) => assert_eq!(status, Some(3)),
        other => panic!("expected RemoteExit(3), got {other:?}"),
    }
}

#[tokio::test]
async fn get_output_lines_returns_stdout_only() {
    let mut rx = get_output_lines("echo", ["hello"]).expect("spawn echo");
    let line = rx.recv().await.expect("one line");
    assert_eq!(line, "hello");
    assert!(rx.recv().await.is_none());
}

#[tokio::test]
async fn is_alive_false_after_exit() {
    let mut proc = Proc::spawn("true", std::iter::empty::<&str>()).expect("spawn true");
    proc.close_stdin();
    let _ = proc.done.await.expect("done fired");
    assert!(!proc.is_alive());
}

#[tokio::test]
async fn signal_on_dead_process_errors_instead_of_panicking() {
    let mut proc = Proc::spawn("true", std::iter::empty::<&str>()).expect("spawn true");
    proc.close_stdin();
    let _ = proc.done.await.expect("done fired");

    let err = proc.signal(Signal::Interrupt).unwrap_err();
    assert!(matches!(err, JudoError::FatalInternal(_)));
}

#[tokio::test]
async fn signal_interrupts_a_sleeping_child() {
    let mut proc = Proc::spawn("sleep", ["30"]).expect("spawn sleep");
    proc.close_stdin();
    assert!(proc.is_alive());

    proc.signal(Signal::Interrupt).expect("signal succeeds");
    let result = proc.done.await.expect("done fired");
    assert!(result.is_err());
}
