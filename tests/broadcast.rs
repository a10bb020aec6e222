use color_eyre::Result;
use common::*;
use pretty_assertions::assert_eq;
use serial_fanout::{config::Config, record::Record};

mod common;

#[tokio::test]
async fn late_viewer_only_sees_later_lines() -> Result<()> {
    let server = start_server().await;
    let port = server.mock.add_port("/dev/ttyACM0");

    let mut first = connect(&server).await?;
    let mut second = connect(&server).await?;
    wait_for_viewers(&server, 2).await?;

    let reply = http_post(&server, "/api/connect", r#"{"port": "/dev/ttyACM0"}"#.into()).await?;
    assert_eq!(reply["success"], true);

    port.write("A\r\n");

    assert_eq!(receive(&mut first).await?, Record::data("A"));
    assert_eq!(receive(&mut second).await?, Record::data("A"));

    let mut third = connect(&server).await?;
    wait_for_viewers(&server, 3).await?;

    port.write("B\r\n");

    assert_eq!(receive(&mut first).await?, Record::data("B"));
    assert_eq!(receive(&mut second).await?, Record::data("B"));
    assert_eq!(receive(&mut third).await?, Record::data("B"));

    assert_silent(&mut third).await;

    Ok(())
}

#[tokio::test]
async fn wire_format_is_data_envelope() -> Result<()> {
    let server = start_server().await;
    let port = server.mock.add_port("/dev/ttyACM0");

    let mut viewer = connect(&server).await?;
    wait_for_viewers(&server, 1).await?;

    let reply = server.relay.control().open_connection("/dev/ttyACM0", None).await;
    assert!(reply.success);

    port.write("hello \"world\"\r\n");

    let message = futures::StreamExt::next(&mut viewer).await.unwrap()?;

    assert_eq!(
        message.to_text()?,
        r#"{"type":"data","data":"hello \"world\""}"#
    );

    Ok(())
}

#[tokio::test]
async fn lines_split_over_writes_arrive_whole() -> Result<()> {
    let server = start_server().await;
    let port = server.mock.add_port("/dev/ttyACM0");

    let mut viewer = connect(&server).await?;
    wait_for_viewers(&server, 1).await?;

    server
        .relay
        .control()
        .open_connection("/dev/ttyACM0", Some(115_200))
        .await;

    for chunk in ["tem", "p=2", "1.5\r", "\nhum", "id=40\r\n"] {
        port.write(chunk);
    }

    assert_eq!(receive(&mut viewer).await?, Record::data("temp=21.5"));
    assert_eq!(receive(&mut viewer).await?, Record::data("humid=40"));

    Ok(())
}

#[tokio::test]
async fn departed_viewer_does_not_hold_up_others() -> Result<()> {
    let server = start_server().await;
    let port = server.mock.add_port("/dev/ttyACM0");

    let mut staying = connect(&server).await?;
    let leaving = connect(&server).await?;
    wait_for_viewers(&server, 2).await?;

    server.relay.control().open_connection("/dev/ttyACM0", None).await;

    drop(leaving);

    for i in 0..10 {
        port.write(format!("line {i}\r\n"));
    }

    for i in 0..10 {
        assert_eq!(
            receive(&mut staying).await?,
            Record::data(format!("line {i}"))
        );
    }

    wait_for_viewers(&server, 1).await?;

    Ok(())
}

#[tokio::test]
async fn serial_failure_is_silent_for_viewers() -> Result<()> {
    let server = start_server().await;
    let port = server.mock.add_port("/dev/ttyACM0");

    let mut viewer = connect(&server).await?;
    wait_for_viewers(&server, 1).await?;

    server.relay.control().open_connection("/dev/ttyACM0", None).await;

    port.write("before\r\n");
    assert_eq!(receive(&mut viewer).await?, Record::data("before"));

    port.fail("device reports an error");
    port.write("after\r\n");

    assert_silent(&mut viewer).await;

    // The viewer stays attached, it just gets nothing.
    assert_eq!(server.registry().len().await, 1);

    Ok(())
}

#[tokio::test]
async fn configured_delimiter() -> Result<()> {
    let server = start_server_with_config(Config {
        delimiter: "\n".into(),
        ..Default::default()
    })
    .await;
    let port = server.mock.add_port("/dev/ttyS0");

    let mut viewer = connect(&server).await?;
    wait_for_viewers(&server, 1).await?;

    server.relay.control().open_connection("/dev/ttyS0", None).await;

    port.write("one\ntwo\n");

    assert_eq!(receive(&mut viewer).await?, Record::data("one"));
    assert_eq!(receive(&mut viewer).await?, Record::data("two"));

    Ok(())
}
