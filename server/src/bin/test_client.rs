use bincode::{deserialize, serialize};
use shared::{now_ms, ItemKind, Packet};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::sleep;

async fn send(socket: &UdpSocket, server_addr: SocketAddr, packet: &Packet) {
    match serialize(packet) {
        Ok(data) => {
            if let Err(e) = socket.send_to(&data, server_addr).await {
                println!("Failed to send packet: {}", e);
            }
        }
        Err(e) => println!("Failed to serialize packet: {}", e),
    }
}

fn print_frame(packet: &Packet) {
    match packet {
        Packet::ActiveItems { items } => {
            println!("active-items ({} items):", items.len());
            for item in items {
                let state = if item.is_running { "running" } else { "paused" };
                println!(
                    "  [{}] {} ({}, {}, owner {}): {} ms",
                    item.id,
                    item.name,
                    item.kind.label(),
                    state,
                    item.user_name,
                    item.display_ms
                );
            }
        }
        Packet::ConnectedUsers { users } => {
            println!("connected-users: {} online", users.len());
        }
        Packet::RegistrationError { message } => {
            println!("registration-error: {}", message);
        }
        other => println!("Unexpected packet: {:?}", other),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    println!("Client socket bound to {}", socket.local_addr()?);

    let server_addr = "127.0.0.1:8080".parse::<SocketAddr>()?;

    println!("Registering with {}", server_addr);
    send(
        &socket,
        server_addr,
        &Packet::Register {
            user_id: "smoke".to_string(),
            user_name: "Smoke Tester".to_string(),
        },
    )
    .await;

    send(
        &socket,
        server_addr,
        &Packet::CreateItem {
            name: "Smoke stopwatch".to_string(),
            kind: ItemKind::Stopwatch,
            duration_secs: None,
            owner: None,
        },
    )
    .await;
    send(
        &socket,
        server_addr,
        &Packet::CreateItem {
            name: "Smoke countdown".to_string(),
            kind: ItemKind::Countdown,
            duration_secs: Some(3),
            owner: None,
        },
    )
    .await;

    let mut buf = [0u8; 4096];
    let mut started = false;
    let mut item_ids: Vec<u64> = Vec::new();

    // Watch server frames for a few seconds; start both items once we
    // learn their ids, then let the countdown run out.
    for _ in 0..50 {
        send(
            &socket,
            server_addr,
            &Packet::Heartbeat {
                timestamp: now_ms(),
            },
        )
        .await;

        match tokio::time::timeout(Duration::from_millis(500), socket.recv_from(&mut buf)).await {
            Ok(Ok((len, _))) => match deserialize::<Packet>(&buf[0..len]) {
                Ok(packet) => {
                    if let Packet::ActiveItems { items } = &packet {
                        if !started && !items.is_empty() {
                            item_ids = items.iter().map(|i| i.id).collect();
                            for id in &item_ids {
                                send(&socket, server_addr, &Packet::StartItem { item_id: *id })
                                    .await;
                            }
                            started = true;
                            println!("Started items {:?}", item_ids);
                        }
                    }
                    print_frame(&packet);
                }
                Err(e) => println!("Failed to deserialize frame: {}", e),
            },
            Ok(Err(e)) => println!("Error receiving frame: {}", e),
            Err(_) => println!("No frame within 500ms"),
        }

        sleep(Duration::from_millis(100)).await;
    }

    for id in &item_ids {
        send(&socket, server_addr, &Packet::PauseItem { item_id: *id }).await;
        send(&socket, server_addr, &Packet::StopItem { item_id: *id }).await;
    }

    println!("Sending disconnect");
    send(&socket, server_addr, &Packet::Disconnect).await;
    println!("Test client finished");

    Ok(())
}
