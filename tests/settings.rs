use multilayer::settings::{self, OutputFormat, Sweep};
use multilayer::sweep::{self, INTEGRATION_NOTE};

#[test]
fn default_config_reproduces_figure_2() {
    let settings = settings::load_default_config().unwrap();
    assert_eq!(settings.layers.len(), 3);
    assert_eq!(settings.format, OutputFormat::Tsv);
    assert!(matches!(settings.sweep, Sweep::Z { .. }));
    assert!(settings.media["silver"].file.is_absolute());

    let mut stack = settings.build_stack().unwrap();
    assert_eq!(stack.num_layers(), 3);
    assert_eq!(stack.position(1).unwrap(), 0.0);
    assert_eq!(stack.position(0).unwrap(), 300.0);
    assert_eq!(stack.medium(2).unwrap().name(), Some("silver"));

    let output = sweep::run(&settings, &mut stack, false).unwrap();
    assert_eq!(output.columns, vec!["z", "F_TE", "F_TM"]);
    assert!(!output.header.iter().any(|line| line == INTEGRATION_NOTE));
    assert_eq!(output.rows.len(), 101);

    let expected = [
        (0.0, 0.24190098),
        (100.0, 2.54848769),
        (200.0, 0.02325695),
        (300.0, 2.35591136),
        (400.0, 3.82854307),
    ];
    for (z, te) in expected {
        let row = output
            .rows
            .iter()
            .find(|row| row[0] == z)
            .unwrap_or_else(|| panic!("no row at z = {}", z));
        assert!((row[1] - te).abs() < 1e-7, "z = {}: {}", z, row[1]);
    }
}

#[test]
fn spectrum_of_distributed_emitters() {
    let mut settings = settings::load_default_config().unwrap();
    settings.sweep = toml::from_str(
        r#"
        kind = "spectrum"
        angle = 0.0
        distribution = { file = "data/distribution.txt" }
        wavelength = { start = 500.0, stop = 540.0, step = 20.0 }
        "#,
    )
    .unwrap();
    settings.resolve_paths(&settings::retrieve_project_root().unwrap());
    settings.validate().unwrap();

    let mut stack = settings.build_stack().unwrap();
    let output = sweep::run(&settings, &mut stack, false).unwrap();
    assert_eq!(output.rows.len(), 3);
    assert!(output.header.iter().any(|line| line == INTEGRATION_NOTE));
    for row in &output.rows {
        // at normal incidence both polarizations see the same stack
        assert!((row[1] - row[2]).abs() < 1e-9, "{:?}", row);
        assert!(row[1] > 0.0);
    }
}
