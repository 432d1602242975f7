use std::env;
use std::fs::File;
use std::io::{self, BufReader, Write};
use std::path::PathBuf;

use tracing_subscriber::EnvFilter;

use mission_engine::components::world::{Creature, MissionId, MonsterId, NpcId, PlayerId, Tripoint};
use mission_engine::core::settings::{EngineSettings, SettingsError, DEFAULT_SETTINGS_PATH};
use mission_engine::data::missions::MissionOrigin;
use mission_engine::simulation::directory::MissionTransition;
use mission_engine::simulation::mission::Mission;
use mission_engine::simulation::mission_type::MissionTypeId;
use mission_engine::simulation::mission_world::MissionWorld;
use mission_engine::simulation::sandbox::{SandboxWorld, TOWN_TERRAIN};
use mission_engine::world::MissionDb;
use mission_engine::MissionSession;

const PLAYER: PlayerId = PlayerId(1);
const COMMANDS: &str = "Commands: types | random <origin> [npc] | reserve <type> [npc] | assign <uid> | list | show <uid> | tick [n] | step <uid> <n> | wrap <uid> | fail <uid> | kill npc <id> | kill monster <type> | give <item> <n> | goto <x> <y> | save [path] | load [path] | legacy <path> | check | quit";

fn main() {
    init_tracing();
    println!("Initializing Mission Engine (Debug Console)...");

    let settings = match parse_args(env::args().collect()) {
        Ok(settings) => settings,
        Err(err) => {
            eprintln!("Failed to load settings: {}", err);
            std::process::exit(1);
        }
    };
    let mut session = MissionSession::new(settings);
    populate_demo_world(&mut session.sandbox_mut());
    println!(
        "Loaded {} mission types from {}",
        session.registry().len(),
        session.settings().catalog_path.display()
    );

    // Monsters killed from the console that were never spawned by a mission.
    let mut next_wild_monster = 100_000;

    println!("{}", COMMANDS);
    loop {
        print!("> ");
        if io::stdout().flush().is_err() {
            break;
        }

        let mut input = String::new();
        match io::stdin().read_line(&mut input) {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
        let trimmed = input.trim();
        if trimmed.is_empty() {
            continue;
        }

        let mut parts = trimmed.split_whitespace();
        let cmd = parts.next().unwrap_or("").to_lowercase();

        match cmd.as_str() {
            "quit" | "exit" => break,
            "help" => println!("{}", COMMANDS),
            "types" => {
                for mission_type in session.registry().get_all() {
                    println!(
                        "{} \"{}\" goal={:?} place={} start={} follow_up={}",
                        mission_type.id,
                        mission_type.name,
                        mission_type.goal,
                        mission_type.place.name(),
                        mission_type.start.name(),
                        mission_type
                            .follow_up
                            .as_ref()
                            .map(|id| id.to_string())
                            .unwrap_or_else(|| "-".to_string())
                    );
                }
            }
            "random" => {
                let Some(origin) = parts.next().and_then(MissionOrigin::parse) else {
                    println!("Usage: random <game_start|opener_npc|any_npc|secondary> [npc]");
                    continue;
                };
                let npc = parts.next().and_then(|raw| raw.parse().ok()).map(NpcId);
                let at = session
                    .sandbox()
                    .player_position(PLAYER)
                    .unwrap_or(Tripoint::new(0, 0, 0));
                match session.reserve_random(origin, at, npc) {
                    Some(uid) => println!("Offered mission {}", uid),
                    None => println!("No mission type is offered here."),
                }
            }
            "reserve" => {
                let Some(type_id) = parts.next() else {
                    println!("Usage: reserve <type> [npc]");
                    continue;
                };
                let npc = parts.next().and_then(|raw| raw.parse().ok()).map(NpcId);
                match session.reserve_new(&MissionTypeId::new(type_id), npc) {
                    Ok(uid) => println!("Reserved mission {}", uid),
                    Err(err) => println!("{}", err),
                }
            }
            "assign" => {
                let Some(uid) = parse_uid(parts.next()) else {
                    println!("Usage: assign <uid>");
                    continue;
                };
                match session.assign(uid, PLAYER) {
                    Ok(status) => println!("Mission {} is now {}", uid, status),
                    Err(err) => println!("{}", err),
                }
            }
            "list" => {
                let directory = session.directory();
                if directory.is_empty() {
                    println!("No missions.");
                }
                for mission in directory.missions() {
                    print_mission_line(mission);
                }
            }
            "show" => {
                let Some(uid) = parse_uid(parts.next()) else {
                    println!("Usage: show <uid>");
                    continue;
                };
                match session.directory().find(uid) {
                    Some(mission) => print_mission(mission),
                    None => println!("No mission {}", uid),
                }
            }
            "tick" => {
                let turns = parts
                    .next()
                    .and_then(|raw| raw.parse::<u32>().ok())
                    .unwrap_or(1);
                for _ in 0..turns {
                    let snapshot = session.tick();
                    for event in &snapshot.events {
                        println!("  {}", event);
                    }
                    for summary in &snapshot.active {
                        session
                            .sandbox_mut()
                            .pick_up_mission_items(PLAYER, summary.uid);
                    }
                }
                println!("{}", session.time());
            }
            "step" => {
                let (Some(uid), Some(step)) = (
                    parse_uid(parts.next()),
                    parts.next().and_then(|raw| raw.parse::<u32>().ok()),
                ) else {
                    println!("Usage: step <uid> <n>");
                    continue;
                };
                match session.step_complete(uid, step) {
                    Ok(true) => println!("Mission {} reached step {}", uid, step),
                    Ok(false) => println!("Mission {} is not running", uid),
                    Err(err) => println!("{}", err),
                }
            }
            "wrap" => {
                let Some(uid) = parse_uid(parts.next()) else {
                    println!("Usage: wrap <uid>");
                    continue;
                };
                match session.wrap_up(uid) {
                    Ok(Some(follow_up)) => {
                        println!("Mission {} succeeded; follow-up {} started", uid, follow_up)
                    }
                    Ok(None) => println!("Mission {} succeeded", uid),
                    Err(err) => println!("{}", err),
                }
            }
            "fail" => {
                let Some(uid) = parse_uid(parts.next()) else {
                    println!("Usage: fail <uid>");
                    continue;
                };
                match session.fail(uid) {
                    Ok(true) => println!("Mission {} failed", uid),
                    Ok(false) => println!("Mission {} was already finished", uid),
                    Err(err) => println!("{}", err),
                }
            }
            "kill" => match (parts.next(), parts.next()) {
                (Some("npc"), Some(raw)) => {
                    let Ok(id) = raw.parse::<i32>() else {
                        println!("Invalid npc id: {}", raw);
                        continue;
                    };
                    let npc = NpcId(id);
                    if !session.sandbox_mut().kill_npc(npc) {
                        println!("No npc {}", id);
                        continue;
                    }
                    print_transitions(&session.on_creature_death(&Creature::Npc { id: npc }));
                }
                (Some("monster"), Some(monster_type)) => {
                    let tagged = session
                        .sandbox()
                        .monsters()
                        .iter()
                        .find(|monster| monster.monster_type == monster_type)
                        .map(|monster| monster.id);
                    let creature = match tagged.and_then(|id| session.sandbox_mut().take_monster(id)) {
                        Some(monster) => Creature::Monster {
                            id: monster.id,
                            monster_type: monster.monster_type,
                            mission: monster.mission,
                        },
                        None => {
                            next_wild_monster += 1;
                            Creature::Monster {
                                id: MonsterId(next_wild_monster),
                                monster_type: monster_type.to_string(),
                                mission: None,
                            }
                        }
                    };
                    print_transitions(&session.on_creature_death(&creature));
                }
                _ => println!("Usage: kill npc <id> | kill monster <type>"),
            },
            "give" => {
                let (Some(item), Some(count)) = (
                    parts.next(),
                    parts.next().and_then(|raw| raw.parse::<u32>().ok()),
                ) else {
                    println!("Usage: give <item> <n>");
                    continue;
                };
                session.sandbox_mut().give_item(PLAYER, item, count);
                println!("Inventory: {:?}", session.sandbox().inventory(PLAYER));
            }
            "goto" => {
                let (Some(x), Some(y)) = (
                    parts.next().and_then(|raw| raw.parse::<i32>().ok()),
                    parts.next().and_then(|raw| raw.parse::<i32>().ok()),
                ) else {
                    println!("Usage: goto <x> <y>");
                    continue;
                };
                session
                    .sandbox_mut()
                    .set_player_position(PLAYER, Tripoint::new(x, y, 0));
                println!("Player moved to {}", Tripoint::new(x, y, 0));
            }
            "save" => match parts.next() {
                Some(path) => match session.save_to_path(path) {
                    Ok(()) => println!("Saved missions to {}", path),
                    Err(err) => println!("Save failed: {}", err),
                },
                None => {
                    let path = session.settings().save_db_path.clone();
                    let result = MissionDb::open(&path)
                        .map_err(|err| err.to_string())
                        .and_then(|mut db| session.save_to_db(&mut db).map_err(|err| err.to_string()));
                    match result {
                        Ok(()) => println!("Saved missions to {}", path.display()),
                        Err(err) => println!("Save failed: {}", err),
                    }
                }
            },
            "load" => match parts.next() {
                Some(path) => match session.load_from_path(path) {
                    Ok(count) => println!("Restored {} missions from {}", count, path),
                    Err(err) => println!("Load failed: {}", err),
                },
                None => {
                    let path = session.settings().save_db_path.clone();
                    let result = MissionDb::open(&path)
                        .map_err(|err| err.to_string())
                        .and_then(|db| session.load_from_db(&db).map_err(|err| err.to_string()));
                    match result {
                        Ok(Some(count)) => {
                            println!("Restored {} missions from {}", count, path.display())
                        }
                        Ok(None) => println!("No save in {}", path.display()),
                        Err(err) => println!("Load failed: {}", err),
                    }
                }
            },
            "legacy" => {
                let Some(path) = parts.next() else {
                    println!("Usage: legacy <path>");
                    continue;
                };
                let file = match File::open(path) {
                    Ok(file) => file,
                    Err(err) => {
                        println!("Cannot open {}: {}", path, err);
                        continue;
                    }
                };
                match session.load_legacy(BufReader::new(file)) {
                    Ok(report) => {
                        println!(
                            "Migrated {} of {} legacy missions",
                            report.loaded, report.declared
                        );
                        for dropped in &report.dropped {
                            println!("  dropped: {}", dropped);
                        }
                    }
                    Err(err) => println!("Legacy load failed: {}", err),
                }
            }
            "check" => match session.check_consistency() {
                Ok(warnings) if warnings.is_empty() => println!("Catalog is consistent."),
                Ok(warnings) => {
                    for warning in warnings {
                        println!("  warning: {}", warning);
                    }
                }
                Err(err) => println!("{}", err),
            },
            _ => println!("Unknown command. Type 'help' for the command list."),
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

fn parse_args(args: Vec<String>) -> Result<EngineSettings, SettingsError> {
    let mut iter = args.iter().skip(1);
    let mut config_path = PathBuf::from(DEFAULT_SETTINGS_PATH);
    let mut catalog = None;
    let mut db = None;
    let mut seed = None;
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => {
                if let Some(value) = iter.next() {
                    config_path = PathBuf::from(value);
                }
            }
            "--catalog" => catalog = iter.next().map(PathBuf::from),
            "--db" => db = iter.next().map(PathBuf::from),
            "--seed" => seed = iter.next().and_then(|value| value.parse::<u64>().ok()),
            _ => {}
        }
    }

    let mut settings = EngineSettings::load(&config_path)?;
    if let Some(catalog) = catalog {
        settings.catalog_path = catalog;
    }
    if let Some(db) = db {
        settings.save_db_path = db;
    }
    if let Some(seed) = seed {
        settings.seed = seed;
    }
    Ok(settings)
}

/// A small town with a few npcs and the sites the start routines look for.
fn populate_demo_world(world: &mut SandboxWorld) {
    world.set_player_position(PLAYER, Tripoint::new(0, 0, 0));
    for x in -2..=2 {
        for y in -2..=2 {
            world.set_terrain(Tripoint::new(x, y, 0), TOWN_TERRAIN);
        }
    }
    let sites = [
        ("house", (4, 1)),
        ("house", (-5, 3)),
        ("bank", (3, -4)),
        ("hospital", (10, 6)),
        ("shelter", (-7, -2)),
        ("prison", (14, -9)),
        ("forest_thick", (-12, 8)),
        ("field", (9, -3)),
        ("cabin", (-15, -11)),
        ("church", (-8, 9)),
        ("fema_entrance", (18, 12)),
        ("farm", (-20, 5)),
    ];
    for (terrain, (x, y)) in sites {
        world.set_terrain(Tripoint::new(x, y, 0), terrain);
    }

    let roster = [
        (1, "NC_DOCTOR", (1, 0)),
        (2, "NC_HUNTER", (-1, 2)),
        (3, "NC_EVAC_SHOPKEEP", (2, -1)),
        (4, "NC_BOUNTY_HUNTER", (6, 6)),
    ];
    for (id, class, (x, y)) in roster {
        world.add_npc(NpcId(id), class, Tripoint::new(x, y, 0));
    }
}

fn parse_uid(raw: Option<&str>) -> Option<MissionId> {
    raw.map(|raw| raw.trim_start_matches('#'))
        .and_then(|raw| raw.parse::<u32>().ok())
        .map(MissionId)
}

fn print_mission_line(mission: &Mission) {
    println!(
        "{} {} [{}] {}",
        mission.get_id(),
        mission.name(),
        mission.get_type().id,
        mission.status()
    );
}

fn print_mission(mission: &Mission) {
    print_mission_line(mission);
    if !mission.get_description().is_empty() {
        println!("  {}", mission.get_description());
    }
    match mission.get_monster_kill_goal() {
        Some(kills) => println!(
            "  goal: {:?} {} {}/{}",
            mission.goal(),
            mission.get_monster_type().unwrap_or("monsters"),
            mission.get_step(),
            kills
        ),
        None => println!("  goal: {:?} step {}", mission.goal(), mission.get_step()),
    }
    if let Some(target) = mission.get_target() {
        println!("  target: {}", target);
    }
    if let Some(deadline) = mission.get_deadline() {
        println!("  deadline: turn {}", deadline);
    }
    if let Some(npc) = mission.get_npc_id() {
        println!("  giver: npc {}", npc.0);
    }
    if let Some(player) = mission.get_assigned_player_id() {
        println!("  holder: player {}", player.0);
    }
    match mission.get_factions() {
        (None, None) => {}
        (good, bad) => println!(
            "  factions: helps {} hurts {}",
            good.map_or("-".to_string(), |id| id.0.to_string()),
            bad.map_or("-".to_string(), |id| id.0.to_string())
        ),
    }
    if let Some(follow_up) = mission.get_follow_up() {
        println!("  follow-up: {}", follow_up);
    }
    println!("  offer: {}", mission.dialogue_for_topic("offer"));
}

fn print_transitions(transitions: &[MissionTransition]) {
    if transitions.is_empty() {
        println!("No mission reacted.");
    }
    for transition in transitions {
        println!(
            "  {} [{}] -> {} ({})",
            transition.uid, transition.type_id, transition.status, transition.reason
        );
    }
}
