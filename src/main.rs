use clap::{Arg, ArgAction, Command};
use sinkbox::floating_type_mod::FT;
use sinkbox::{
    GameController, GameEvent, GameEventSink, GameParameters, MaterialDatabase, NullRenderHost,
    SIMULATION_STEP_TIME_DURATION,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

const CARGO_PKG_VERSION: &str = env!("CARGO_PKG_VERSION");
const CARGO_PKG_DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

struct EventLogger;

impl GameEventSink for EventLogger {
    fn on_game_event(&mut self, event: &GameEvent) {
        match event {
            GameEvent::FrameRate { .. } | GameEvent::UpdateToRenderRatio { .. } => {}
            other => tracing::info!(?other, "game event"),
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let matches = Command::new("sinkbox")
        .version(CARGO_PKG_VERSION)
        .about(CARGO_PKG_DESCRIPTION)
        .subcommand_required(true)
        .subcommand(
            Command::new("run")
                .about("Run a ship headlessly for a number of ticks")
                .arg(Arg::new("SHIP").help("Ship file (manifest or bare structural image)").required(true))
                .arg(
                    Arg::new("MATERIALS_DIR")
                        .long("materials-dir")
                        .short('m')
                        .default_value("Data")
                        .help("Directory holding materials_structural.yaml and materials_electrical.yaml"),
                )
                .arg(
                    Arg::new("PARAMETERS")
                        .long("parameters")
                        .short('p')
                        .help("YAML file overriding the default game parameters"),
                )
                .arg(
                    Arg::new("TICKS")
                        .long("ticks")
                        .short('t')
                        .default_value("500")
                        .help("Number of simulation steps to run"),
                )
                .arg(
                    Arg::new("SEED")
                        .long("seed")
                        .short('s')
                        .default_value("0")
                        .help("Seed for the random engine"),
                )
                .arg(
                    Arg::new("SINK")
                        .long("sink")
                        .action(ArgAction::SetTrue)
                        .help("Flood the lowest particle so the ship takes in water"),
                ),
        )
        .subcommand(
            Command::new("scan")
                .about("Scan a directory of ship files and print the previews")
                .arg(Arg::new("DIRECTORY").required(true)),
        )
        .get_matches();

    match matches.subcommand() {
        Some(("run", run_matches)) => {
            let ship_path = run_matches.get_one::<String>("SHIP").expect("missing ship file");
            let materials_dir = run_matches
                .get_one::<String>("MATERIALS_DIR")
                .expect("has a default");
            let ticks: u64 = run_matches
                .get_one::<String>("TICKS")
                .expect("has a default")
                .parse()
                .expect("TICKS must be an integer");
            let seed: u64 = run_matches
                .get_one::<String>("SEED")
                .expect("has a default")
                .parse()
                .expect("SEED must be an integer");

            let materials_dir = Path::new(materials_dir);
            let material_database = MaterialDatabase::load(
                materials_dir.join("materials_structural.yaml"),
                materials_dir.join("materials_electrical.yaml"),
            )
            .unwrap_or_else(|error| {
                eprintln!("failed to load material database: {}", error);
                std::process::exit(1);
            });

            let mut controller = GameController::new(Arc::new(material_database), 1280, 720, seed);

            if let Some(parameters_path) = run_matches.get_one::<String>("PARAMETERS") {
                let yaml = std::fs::read_to_string(parameters_path).expect("failed reading parameters file");
                let parameters: GameParameters =
                    serde_yaml::from_str(&yaml).expect("failed parsing parameters file");
                *controller.game_parameters_mut() = parameters;
            }

            controller.register_event_sink(Box::new(EventLogger));

            if let Err(error) = controller.add_ship(ship_path) {
                eprintln!("failed to load ship: {}", error);
                std::process::exit(1);
            }

            if run_matches.get_flag("SINK") {
                let ship = &controller.world().ships()[0];
                let lowest = (0..ship.points.ship_point_count())
                    .min_by(|&a, &b| {
                        ship.points.v.position[a]
                            .y
                            .partial_cmp(&ship.points.v.position[b].y)
                            .unwrap()
                    })
                    .expect("ship has no points");
                let position = ship.points.v.position[lowest];
                let screen = controller.view_model().world_to_screen(position);
                controller.flood_at(screen, 10.0);
            }

            let start = Instant::now();
            let mut host = NullRenderHost;
            for tick in 0..ticks {
                controller.update();

                // Render every third tick, as a render-starved host would
                if tick % 3 == 0 {
                    controller.render(&mut host);
                }
            }
            let elapsed = start.elapsed();

            let ship = &controller.world().ships()[0];
            println!(
                "{} ticks ({}s simulated) in {:.1}ms ({:.3}ms/tick)",
                ticks,
                ticks as FT * SIMULATION_STEP_TIME_DURATION,
                elapsed.as_secs_f64() * 1000.,
                elapsed.as_secs_f64() * 1000. / ticks as f64,
            );
            println!(
                "{} points, {} live springs, {} live triangles, {} burning",
                ship.points.ship_point_count(),
                ship.springs.live_spring_count(),
                ship.triangles.live_triangle_count(),
                ship.points.burning_points().len(),
            );
        }

        Some(("scan", scan_matches)) => {
            let directory = scan_matches.get_one::<String>("DIRECTORY").expect("required");

            let scanner = sinkbox::preview::ShipPreviewScanner::new();
            scanner.set_directory(directory.as_str());

            let mut expected = None;
            let mut received = 0usize;
            loop {
                match scanner.poll_message() {
                    Some(sinkbox::preview::PreviewMessage::DirScanCompleted { ship_files }) => {
                        println!("{} ship file(s) in {}", ship_files.len(), directory);
                        expected = Some(ship_files.len());
                    }
                    Some(sinkbox::preview::PreviewMessage::PreviewReady { metadata, .. }) => {
                        match metadata.author {
                            Some(author) => println!("  {} by {}", metadata.ship_name, author),
                            None => println!("  {}", metadata.ship_name),
                        }
                        received += 1;
                    }
                    Some(sinkbox::preview::PreviewMessage::PreviewError { index, message }) => {
                        println!("  #{}: {}", index, message);
                        received += 1;
                    }
                    Some(sinkbox::preview::PreviewMessage::DirScanError { message }) => {
                        eprintln!("{}", message);
                        std::process::exit(1);
                    }
                    None => {
                        if Some(received) == expected {
                            break;
                        }
                        std::thread::sleep(std::time::Duration::from_millis(10));
                    }
                }
            }
        }

        _ => unreachable!(),
    }
}
