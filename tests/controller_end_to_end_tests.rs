//! End-to-end tests for the stage controller
//!
//! These drive the full wizard against a fake `platformio` shell script, so they
//! only run on unix hosts.

#![cfg(unix)]


use oatfw::controller::PLATFORMIO;
use oatfw::fetch::{ARCHIVE_FILE_NAME, FIRMWARE_DIR_NAME};
use oatfw::{AppEvent, Stage, StageController, StageRequest, WizardError};
use std::sync::Arc;
use test_fixtures::{Rig, ScriptedReleases, SINGLE_RELEASE, drain_events};

/// Launch, pick `v1.0` and download it
async fn downloaded(rig: &Rig) -> (StageController, tokio::sync::mpsc::UnboundedReceiver<AppEvent>) {
    let (mut controller, rx) = rig.launch().await;
    controller.wait_for(StageRequest::FetchReleases).await.unwrap();
    controller.select_release(1).unwrap();
    controller
        .run_stage(StageRequest::DownloadFirmware)
        .await
        .unwrap();
    (controller, rx)
}

/// Downloaded, environment and local configuration chosen
async fn buildable(rig: &Rig, env: &str) -> (StageController, tokio::sync::mpsc::UnboundedReceiver<AppEvent>) {
    let (mut controller, rx) = downloaded(rig).await;
    controller.select_environment(env).unwrap();
    controller.select_local_config(rig.local_config.clone()).unwrap();
    assert_eq!(controller.stage(), Stage::Buildable);
    (controller, rx)
}

#[tokio::test]
async fn test_release_list_starts_with_develop() {
    let rig = Rig::new();
    let (mut controller, _rx) = rig.launch().await;
    assert_eq!(controller.stage(), Stage::FetchingReleases);

    controller.wait_for(StageRequest::FetchReleases).await.unwrap();

    let names: Vec<_> = controller
        .state()
        .release_list()
        .iter()
        .map(|r| r.display_name.as_str())
        .collect();
    assert_eq!(names, vec!["develop", "v1.0"]);
    assert_eq!(controller.state().selected_release_index(), Some(0));
    assert_eq!(controller.stage(), Stage::ReleasesReady);
}

#[tokio::test]
async fn test_download_extracts_to_fixed_directory() {
    let rig = Rig::new();
    let (controller, mut rx) = downloaded(&rig).await;

    let fw_dir = controller.state().firmware_directory().unwrap();
    assert!(fw_dir.ends_with(FIRMWARE_DIR_NAME));
    assert!(!fw_dir.ends_with("proj-v1.0"));
    assert!(fw_dir.join("platformio.ini").exists());
    assert_eq!(
        *rig.downloader.requested.lock().unwrap(),
        vec!["https://x/a.zip".to_string()]
    );

    let envs: Vec<_> = controller
        .state()
        .board_environments()
        .iter()
        .map(|e| (e.raw_identifier.as_str(), e.display_name.as_str()))
        .collect();
    assert_eq!(envs, vec![("ramps", "RAMPS"), ("esp32", "ESP32")]);
    assert_eq!(controller.stage(), Stage::EnvironmentsReady);

    let stages: Vec<_> = drain_events(&mut rx)
        .into_iter()
        .filter_map(|e| match e {
            AppEvent::StageChanged(stage) => Some(stage),
            _ => None,
        })
        .collect();
    assert!(stages.ends_with(&[
        Stage::Downloading,
        Stage::Extracting,
        Stage::EnvironmentsReady
    ]));
}

#[tokio::test]
async fn test_failed_build_blocks_upload() {
    let rig = Rig::new();
    rig.set_build_exit(1);
    rig.set_ports(r#"[{"port":"COM3"}]"#);
    let (mut controller, _rx) = buildable(&rig, "esp32").await;

    controller.run_stage(StageRequest::RefreshPorts).await.unwrap();
    controller.select_upload_port("COM3").unwrap();

    let result = controller.run_stage(StageRequest::BuildFirmware).await;
    assert!(matches!(
        result,
        Err(WizardError::ProcessExitNonZero { code: Some(1), .. })
    ));
    assert!(!controller.state().last_build_succeeded());
    assert!(!controller.state().upload_permitted());
    assert_eq!(controller.stage(), Stage::BuildComplete { success: false });

    assert!(matches!(
        controller.request(StageRequest::UploadFirmware).await,
        Err(WizardError::StageNotPermitted(_))
    ));

    // The wizard stays usable: a retry with a fixed toolchain succeeds
    rig.set_build_exit(0);
    controller.run_stage(StageRequest::BuildFirmware).await.unwrap();
    assert_eq!(controller.stage(), Stage::Uploadable);
}

#[tokio::test]
async fn test_build_prepares_firmware_tree() {
    let rig = Rig::new();
    let (mut controller, _rx) = buildable(&rig, "esp32").await;

    controller.run_stage(StageRequest::BuildFirmware).await.unwrap();
    assert!(controller.state().last_build_succeeded());
    assert_eq!(controller.stage(), Stage::BuildComplete { success: true });

    let fw_dir = controller.state().firmware_directory().unwrap().to_path_buf();
    let copied = std::fs::read_to_string(fw_dir.join("Configuration_local.hpp")).unwrap();
    assert!(copied.contains("STEPPER_TYPE_28BYJ48"));

    let ini = std::fs::read_to_string(fw_dir.join("platformio.ini")).unwrap();
    assert!(ini.contains("github.com/OpenAstroTech/AccelStepper#1.61.1"));
    // Not an AVR build
    assert!(ini.contains("platform = atmelavr\n"));

    let calls = rig.calls();
    assert!(calls.contains(&"settings set check_platformio_interval 9999".to_string()));
    assert!(calls.contains(&"settings set enable_telemetry No".to_string()));
    let run = calls.iter().find(|c| c.starts_with("run ")).unwrap();
    assert_eq!(
        run,
        &format!(
            "run --environment esp32 --project-dir {} --verbose",
            fw_dir.display()
        )
    );

    let snapshot = controller.process_snapshot().unwrap();
    assert!(snapshot.accumulated_stdout.contains("Compiling"));
    assert_eq!(snapshot.last_exit_code, Some(0));
}

#[tokio::test]
async fn test_upload_submits_usage_record() {
    let rig = Rig::new();
    rig.set_ports(r#"[{"port":"/dev/ttyUSB0"},{"port":"COM3"}]"#);
    let (mut controller, _rx) = buildable(&rig, "esp32").await;
    controller.run_stage(StageRequest::BuildFirmware).await.unwrap();
    controller.run_stage(StageRequest::RefreshPorts).await.unwrap();
    controller.select_upload_port("COM3").unwrap();
    controller.set_telemetry_enabled(true);
    assert_eq!(controller.stage(), Stage::Uploadable);

    controller.run_stage(StageRequest::UploadFirmware).await.unwrap();
    assert_eq!(controller.stage(), Stage::UploadComplete { success: true });

    let upload = rig
        .calls()
        .into_iter()
        .find(|c| c.contains("--target upload"))
        .unwrap();
    assert!(upload.ends_with("--target upload --upload-port COM3"));

    let records = rig.telemetry.records.lock().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].environment, "esp32");
    assert_eq!(records[0].release, "v1.0");
    assert!(records[0].config_file.contains("STEPPER_TYPE_28BYJ48"));
}

#[tokio::test]
async fn test_telemetry_failure_does_not_fail_upload() {
    let mut rig = Rig::new();
    rig.fail_telemetry();
    rig.set_ports(r#"[{"port":"COM3"}]"#);
    let (mut controller, mut rx) = buildable(&rig, "esp32").await;
    controller.run_stage(StageRequest::BuildFirmware).await.unwrap();
    controller.run_stage(StageRequest::RefreshPorts).await.unwrap();
    controller.select_upload_port("COM3").unwrap();
    controller.set_telemetry_enabled(true);
    assert!(controller.telemetry_enabled());
    drain_events(&mut rx);

    controller.run_stage(StageRequest::UploadFirmware).await.unwrap();
    assert_eq!(controller.stage(), Stage::UploadComplete { success: true });

    let warnings: Vec<_> = drain_events(&mut rx)
        .into_iter()
        .filter_map(|e| match e {
            AppEvent::Warning(message) => Some(message),
            _ => None,
        })
        .collect();
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].contains("collector down"));
}

#[tokio::test]
async fn test_avr_upload_reads_tool_log() {
    let rig = Rig::new();
    rig.set_ports(r#"[{"port":"/dev/ttyACM0"}]"#);
    let (mut controller, mut rx) = buildable(&rig, "ramps").await;

    controller.run_stage(StageRequest::BuildFirmware).await.unwrap();
    let fw_dir = controller.state().firmware_directory().unwrap().to_path_buf();
    let ini = std::fs::read_to_string(fw_dir.join("platformio.ini")).unwrap();
    assert!(ini.contains("platform = atmelavr@4.0.1"));

    controller.run_stage(StageRequest::RefreshPorts).await.unwrap();
    controller.select_upload_port("/dev/ttyACM0").unwrap();
    drain_events(&mut rx);
    controller.run_stage(StageRequest::UploadFirmware).await.unwrap();

    let snapshot = controller.process_snapshot().unwrap();
    assert!(snapshot.env_overrides["PLATFORMIO_UPLOAD_FLAGS"].starts_with("-l"));

    let tool_lines: Vec<_> = drain_events(&mut rx)
        .into_iter()
        .filter_map(|e| match e {
            AppEvent::ProcessOutput(name, level, line) if name == PLATFORMIO => {
                Some((level, line))
            }
            _ => None,
        })
        .collect();
    assert!(tool_lines.contains(&(
        log::Level::Info,
        "avrdude: writing flash (1024 bytes)".to_string()
    )));
}

#[tokio::test]
async fn test_port_refresh_clears_vanished_port() {
    let rig = Rig::new();
    rig.set_ports(r#"[{"port":"COM3"}]"#);
    let (mut controller, _rx) = rig.launch().await;
    controller.wait_for(StageRequest::FetchReleases).await.unwrap();

    controller.run_stage(StageRequest::RefreshPorts).await.unwrap();
    assert_eq!(controller.state().available_serial_ports(), ["COM3"]);
    controller.select_upload_port("COM3").unwrap();
    assert_eq!(controller.state().selected_upload_port(), Some("COM3"));

    rig.set_ports("[]");
    controller.run_stage(StageRequest::RefreshPorts).await.unwrap();
    assert!(controller.state().available_serial_ports().is_empty());
    assert_eq!(controller.state().selected_upload_port(), None);
}

#[tokio::test]
async fn test_requests_while_busy_are_refused() {
    let rig = Rig::new();
    rig.set_build_delay(1);
    let (mut controller, _rx) = buildable(&rig, "esp32").await;

    controller.request(StageRequest::BuildFirmware).await.unwrap();
    assert_eq!(controller.stage(), Stage::Building);

    assert!(matches!(
        controller.request(StageRequest::RefreshPorts).await,
        Err(WizardError::AlreadyRunning(_))
    ));
    assert!(matches!(
        controller.request(StageRequest::BuildFirmware).await,
        Err(WizardError::AlreadyRunning(_))
    ));
    assert!(matches!(
        controller.select_environment("ramps"),
        Err(WizardError::AlreadyRunning(_))
    ));
    assert_eq!(controller.state().selected_environment(), Some("esp32"));

    controller.wait_for(StageRequest::BuildFirmware).await.unwrap();
    assert!(controller.in_flight().is_none());
    controller.run_stage(StageRequest::RefreshPorts).await.unwrap();
}

#[tokio::test]
async fn test_fetch_failure_waits_for_manual_retry() {
    let rig = Rig::new();
    let (mut controller, _rx) = rig
        .launch_with(Arc::new(ScriptedReleases::failing_once(SINGLE_RELEASE)))
        .await;

    let first = controller.wait_for(StageRequest::FetchReleases).await;
    assert!(matches!(first, Err(WizardError::Download(_))));
    assert_eq!(controller.stage(), Stage::FetchingReleases);
    assert!(controller.state().release_list().is_empty());

    controller.run_stage(StageRequest::FetchReleases).await.unwrap();
    assert_eq!(controller.state().release_list().len(), 2);
    assert_eq!(controller.stage(), Stage::ReleasesReady);
}

#[tokio::test]
async fn test_malformed_archive_keeps_download() {
    let rig = Rig::with_archive(&[("README.md", Some("not a firmware tree"))]);
    let (mut controller, _rx) = rig.launch().await;
    controller.wait_for(StageRequest::FetchReleases).await.unwrap();
    controller.select_release(1).unwrap();

    let result = controller.run_stage(StageRequest::DownloadFirmware).await;
    assert!(matches!(result, Err(WizardError::MalformedArchive(_))));
    assert!(rig.work_dir().join(ARCHIVE_FILE_NAME).exists());
    assert!(controller.state().firmware_directory().is_none());
    assert_eq!(controller.stage(), Stage::ReleasesReady);
}

#[tokio::test]
async fn test_archive_without_environments_is_parse_error() {
    let rig = Rig::with_archive(&[
        ("proj/", None),
        ("proj/platformio.ini", Some("[env:native]\nplatform = native\n")),
    ]);
    let (mut controller, _rx) = rig.launch().await;
    controller.wait_for(StageRequest::FetchReleases).await.unwrap();

    let result = controller.run_stage(StageRequest::DownloadFirmware).await;
    assert!(matches!(result, Err(WizardError::Parse(_))));
    // Extraction finished before parsing failed
    assert!(controller.state().firmware_directory().is_some());
    assert!(controller.state().board_environments().is_empty());
}

#[tokio::test]
async fn test_new_release_forces_reselection() {
    let rig = Rig::new();
    let (mut controller, _rx) = buildable(&rig, "ramps").await;
    controller.run_stage(StageRequest::BuildFirmware).await.unwrap();

    controller.select_release(0).unwrap();
    let state = controller.snapshot();
    assert!(state.board_environments().is_empty());
    assert_eq!(state.selected_environment(), None);
    assert!(!state.last_build_succeeded());
    assert!(!state.build_permitted());
    assert_eq!(controller.stage(), Stage::ReleasesReady);

    assert!(matches!(
        controller.request(StageRequest::BuildFirmware).await,
        Err(WizardError::StageNotPermitted(_))
    ));
}

#[tokio::test]
async fn test_redownload_after_build_requires_rebuild() {
    let rig = Rig::new();
    rig.set_ports(r#"[{"port":"COM3"}]"#);
    let (mut controller, _rx) = buildable(&rig, "esp32").await;
    controller.run_stage(StageRequest::BuildFirmware).await.unwrap();
    controller.run_stage(StageRequest::RefreshPorts).await.unwrap();
    controller.select_upload_port("COM3").unwrap();
    assert_eq!(controller.stage(), Stage::Uploadable);

    controller
        .run_stage(StageRequest::DownloadFirmware)
        .await
        .unwrap();

    let fw_dir = controller.state().firmware_directory().unwrap().to_path_buf();
    assert!(!fw_dir.join("Configuration_local.hpp").exists());
    assert!(!controller.state().last_build_succeeded());
    assert!(!controller.state().upload_permitted());
    assert_eq!(controller.state().selected_environment(), Some("esp32"));
    assert_eq!(controller.stage(), Stage::Buildable);
    assert!(matches!(
        controller.request(StageRequest::UploadFirmware).await,
        Err(WizardError::StageNotPermitted(_))
    ));

    controller.run_stage(StageRequest::BuildFirmware).await.unwrap();
    assert!(fw_dir.join("Configuration_local.hpp").exists());
    assert_eq!(controller.stage(), Stage::Uploadable);
}

#[tokio::test]
async fn test_refetch_keeps_selected_release_when_catalog_grows() {
    let rig = Rig::new();
    let later = r#"[{"name":"v2.0","zipball_url":"https://x/b.zip"},{"name":"v1.0","zipball_url":"https://x/a.zip"}]"#;
    let (mut controller, _rx) = rig
        .launch_with(Arc::new(ScriptedReleases::changing(SINGLE_RELEASE, later)))
        .await;
    controller.wait_for(StageRequest::FetchReleases).await.unwrap();
    controller.select_release(1).unwrap();
    controller
        .run_stage(StageRequest::DownloadFirmware)
        .await
        .unwrap();
    controller.select_environment("esp32").unwrap();
    controller.select_local_config(rig.local_config.clone()).unwrap();
    controller.run_stage(StageRequest::BuildFirmware).await.unwrap();

    controller.run_stage(StageRequest::FetchReleases).await.unwrap();

    let state = controller.snapshot();
    assert_eq!(state.release_list().len(), 3);
    assert_eq!(state.selected_release_index(), Some(2));
    assert_eq!(state.selected_release().unwrap().display_name, "v1.0");
    assert_eq!(state.board_environments().len(), 2);
    assert!(state.last_build_succeeded());
    assert_eq!(controller.stage(), Stage::BuildComplete { success: true });
}

#[tokio::test]
async fn test_missing_build_tool_is_config_error() {
    let mut rig = Rig::new();
    rig.config.platformio.executable = "/nonexistent/oatfw-platformio".to_string();
    let services = rig.services(Arc::new(ScriptedReleases::from_catalog(SINGLE_RELEASE)));

    let result = StageController::launch(&rig.config, services, None).await;
    assert!(matches!(result, Err(WizardError::Config(_))));
}
