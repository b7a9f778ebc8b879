use assert_cmd::Command;
use predicates::prelude::*;

const DANFE: &str = "\
DANFE
NF-e Nº 000.004.512 SÉRIE 1
IDENTIFICAÇÃO DO EMITENTE
COMERCIAL ALFA LTDA
CNPJ 11.222.333/0001-81
DESTINATÁRIO / REMETENTE
NOME / RAZÃO SOCIAL CNPJ / CPF DATA DA EMISSÃO
MERCADO BETA LTDA 11.444.777/0001-61 15/03/2024
DADOS DOS PRODUTOS / SERVIÇOS
001 PARAFUSO SEXTAVADO 73181500 00 1102 UN 100 12,50 1.250,00
VALOR TOTAL DA NOTA
1.250,00
";

fn danfe() -> Command {
    Command::cargo_bin("danfe").unwrap()
}

#[test]
fn test_codes_cfop() {
    danfe()
        .args(["codes", "cfop", "1.102"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Compra para revenda"));
}

#[test]
fn test_codes_unknown_cfop_fails() {
    danfe()
        .args(["codes", "cfop", "9999"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("CFOP 9999 not found"));
}

#[test]
fn test_codes_state_rate() {
    danfe()
        .args(["codes", "state", "sp"])
        .assert()
        .success()
        .stdout(predicate::str::contains("SP 18.0%"));
}

#[test]
fn test_process_text_danfe() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("nota.txt");
    std::fs::write(&input, DANFE).unwrap();

    danfe()
        .args(["process", "--no-lookup", "--text-only", "--analyze"])
        .arg(&input)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"number\": \"4512\""))
        .stdout(predicate::str::contains("determination"));
}

#[test]
fn test_process_missing_file_fails() {
    danfe()
        .args(["process", "--no-lookup", "/nonexistent/nota.pdf"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Input file not found"));
}

#[test]
fn test_config_init_and_get() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");

    danfe()
        .arg("--config")
        .arg(&path)
        .args(["config", "init"])
        .assert()
        .success();
    assert!(path.exists());

    danfe()
        .arg("--config")
        .arg(&path)
        .args(["config", "set", "lookup.timeout_secs", "30"])
        .assert()
        .success();

    danfe()
        .arg("--config")
        .arg(&path)
        .args(["config", "get", "lookup.timeout_secs"])
        .assert()
        .success()
        .stdout(predicate::str::contains("30"));
}
