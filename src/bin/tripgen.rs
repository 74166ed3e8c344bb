//! Synthetic trip generator client. External collaborator code: its
//! only contract with the core is the wire protocol it produces,
//! reproduced here from `original_source/tripgen.c`.

use std::io::{self, Write};
use std::net::TcpStream;
use std::thread;
use std::time::Duration;

use clap::Parser;
use rand::Rng;

use tripstore::codec;
use tripstore::config::GeneratorArgs;

const DOLLARS_PER_MINUTE: f32 = 4.0;

fn generate_long_lat(args: &GeneratorArgs, rng: &mut impl Rng) -> (f32, f32) {
    let lng = args.min_long + (args.max_long - args.min_long) * rng.gen::<f32>();
    let lat = args.min_lat + (args.max_lat - args.min_lat) * rng.gen::<f32>();
    (lng, lat)
}

fn generate_trip_seconds(args: &GeneratorArgs, rng: &mut impl Rng) -> u32 {
    let min_seconds = (args.min_trip_minutes * 60.0) as u32;
    let max_seconds = (args.max_trip_minutes * 60.0) as u32;
    min_seconds + ((max_seconds - min_seconds) as f32 * rng.gen::<f32>()) as u32
}

fn recv_trip_id(stream: &mut TcpStream) -> io::Result<i32> {
    let mut buf = [0u8; codec::HEADER_LEN + 4];
    codec::read_exact_retry(stream, &mut buf)?;
    match codec::decode_frame(&buf) {
        Ok(codec::Frame::Id { id }) => Ok(id),
        _ => Err(io::Error::new(io::ErrorKind::InvalidData, "expected an ID reply")),
    }
}

fn run_client(args: &GeneratorArgs) -> io::Result<()> {
    let mut stream = TcpStream::connect((args.host.as_str(), args.port))?;
    let mut rng = rand::thread_rng();

    loop {
        let seconds = generate_trip_seconds(args, &mut rng);
        let fare_cents = ((seconds as f32 / 60.0) * (DOLLARS_PER_MINUTE * 100.0)) as i32;

        let (lng, lat) = generate_long_lat(args, &mut rng);
        codec::write_all_retry(&mut stream, &codec::encode_begin(lng, lat))?;
        let id = recv_trip_id(&mut stream)?;

        for _ in 0..seconds {
            let (lng, lat) = generate_long_lat(args, &mut rng);
            codec::write_all_retry(&mut stream, &codec::encode_update(id, lng, lat))?;
            thread::sleep(Duration::from_secs(1));
        }

        let (lng, lat) = generate_long_lat(args, &mut rng);
        codec::write_all_retry(&mut stream, &codec::encode_end(id, lng, lat, fare_cents))?;
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = GeneratorArgs::parse();

    log::info!("tripgen starting with {} threads.", args.threads);

    let handles: Vec<_> = (0..args.threads)
        .map(|t| {
            let args = args.clone();
            thread::spawn(move || {
                if let Err(e) = run_client(&args) {
                    log::warn!("generator thread {t} exiting: {e}");
                }
            })
        })
        .collect();

    for handle in handles {
        let _ = handle.join();
    }
    let _ = io::stdout().flush();
}
