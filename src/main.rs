use hedrite::{AppConfig, Color, Vec3, polyhedra};

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let shapes = [
        (Vec3::ZERO, Color::CRIMSON),
        (Vec3::new(2.0, 2.0, 0.0), Color::BLUE_VIOLET),
    ];

    let result = hedrite::run(AppConfig::new().title("Hedrite").size(700, 700), move |scene| {
        for (offset, fill) in shapes {
            let points = polyhedra::tetrahedron(offset);
            if let Err(err) = scene.add_polyhedron(
                &points,
                &polyhedra::TETRAHEDRON_FACES,
                fill,
                Some(fill.brighter(1.0)),
            ) {
                log::error!("Failed to build tetrahedron: {err}");
            }
        }
    });

    if let Err(err) = result {
        log::error!("{err}");
        std::process::exit(1);
    }
}
