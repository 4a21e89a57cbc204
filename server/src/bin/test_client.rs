use bincode::{deserialize, serialize};
use clap::Parser;
use shared::{InputState, Packet, PROTOCOL_VERSION};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::{sleep, timeout};

/// Scripted client that connects, walks in a square and leaves
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short, long, default_value = "127.0.0.1:3000")]
    server: SocketAddr,

    /// Number of input samples to send
    #[arg(short, long, default_value = "20")]
    inputs: u32,
}

fn input_for(step: u32) -> InputState {
    match (step / 5) % 4 {
        0 => InputState {
            right: true,
            ..InputState::default()
        },
        1 => InputState {
            down: true,
            ..InputState::default()
        },
        2 => InputState {
            left: true,
            ..InputState::default()
        },
        _ => InputState {
            up: true,
            ..InputState::default()
        },
    }
}

async fn recv_packet(socket: &UdpSocket, buf: &mut [u8]) -> Option<Packet> {
    match timeout(Duration::from_secs(2), socket.recv_from(buf)).await {
        Ok(Ok((len, _))) => deserialize::<Packet>(&buf[0..len]).ok(),
        _ => None,
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    println!("Client socket bound to {}", socket.local_addr()?);

    let connect_data = serialize(&Packet::Connect {
        client_version: PROTOCOL_VERSION,
    })?;
    println!("Sending connection request to {}", args.server);
    socket.send_to(&connect_data, args.server).await?;

    let mut buf = vec![0u8; 65536];

    let client_id = match recv_packet(&socket, &mut buf).await {
        Some(Packet::Connected { client_id }) => client_id,
        Some(Packet::Disconnected { reason }) => {
            println!("Connection refused: {}", reason);
            return Ok(());
        }
        other => {
            println!("Expected Connected but got: {:?}", other);
            return Ok(());
        }
    };
    println!("Connection accepted with client ID: {}", client_id);

    for sequence in 1..=args.inputs {
        let input = input_for(sequence - 1);
        let input_data = serialize(&Packet::Input { sequence, input })?;
        socket.send_to(&input_data, args.server).await?;

        // Skip broadcasts until our acknowledgment shows up
        loop {
            match recv_packet(&socket, &mut buf).await {
                Some(Packet::StateAck {
                    x,
                    y,
                    last_processed_input,
                }) => {
                    println!(
                        "Ack {}: position ({}, {})",
                        last_processed_input, x, y
                    );
                    break;
                }
                Some(Packet::CurrentState { players }) => {
                    println!("Current state: {} players", players.len());
                }
                Some(Packet::PlayerJoined { player }) => {
                    println!("Player {} joined ({})", player.id, player.color);
                }
                Some(Packet::PlayerLeft { id }) => println!("Player {} left", id),
                Some(Packet::TickSnapshot { players }) => {
                    println!("Tick snapshot: {} players", players.len());
                }
                Some(other) => println!("Unexpected packet: {:?}", other),
                None => {
                    println!("No acknowledgment for input {}", sequence);
                    break;
                }
            }
        }

        sleep(Duration::from_millis(50)).await;
    }

    let disconnect_data = serialize(&Packet::Disconnect)?;
    println!("Sending disconnect request");
    socket.send_to(&disconnect_data, args.server).await?;

    println!("Test client finished");
    Ok(())
}
