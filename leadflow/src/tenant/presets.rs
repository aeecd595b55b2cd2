//! Built-in tenant configurations.

use std::collections::BTreeMap;

use super::config::{CountryConfig, MilestoneWindow, OfferSpeedRule, TenantConfig};
use super::fields::FieldSpec;
use crate::errors::ConfigError;
use crate::funnel::{Stage, StageModel, StatusLabels};
use crate::utils::DialingCodes;

const ITALY_PIPELINES: [&str; 2] = ["Italy", "Italian"];

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(ToString::to_string).collect()
}

fn swiss_medica_funnel() -> Result<StageModel, ConfigError> {
    let qualification_fields = ["1 Квалификация", "Qualification", "1_kvalifikatsija"];
    StageModel::new(
        "sm",
        vec![
            Stage::new("raw_lead", "Raw leads", 0),
            Stage::new("lead", "Leads", 1).with_statuses([
                "НОВЫЕ ЗАЯВКИ",
                "ПРОДОЛЖИТЬ РАБОТУ",
                "0. ВЫХОД НА КОНТАКТ",
            ]),
            Stage::new("continue_to_work", "Continue to work", 2)
                .with_statuses(["ПРОДОЛЖИТЬ РАБОТУ"]),
            Stage::new("trying_to_get_in_touch", "Trying to get in touch", 3)
                .with_statuses(["0. ВЫХОД НА КОНТАКТ", "1. TRYING TO GET IN TOUCH"]),
            Stage::new("target", "Target leads", 4).with_fields(["tselevoj", "tselevoj!", "Целевой!"]),
            Stage::new("getting_questionnaire", "Getting questionnaire", 5)
                .with_statuses(["1. ПОЛУЧЕНИЕ ОПРОСНИКА"])
                .with_fields(["1 Квалификация"]),
            Stage::new("anamnesis_gathering", "Anamnesis gathering", 6)
                .with_statuses(["2. ДОСБОР АНАМНЕЗА"]),
            Stage::new("qualification", "Qual leads", 7)
                .with_statuses(["3.1. ПЕРЕГОВОРЫ ПО ПРОГРАММЕ"])
                .with_fields(qualification_fields),
            Stage::new("scheduling_consultation", "Scheduling consultation", 8)
                .with_statuses(["2.1 СОГЛАСОВЫВАЕМ ДАТУ КОНСУЛЬТАЦИИ"])
                .with_fields(["Получен опросник"]),
            Stage::new("waiting_for_consultation", "Waiting for consultation", 9)
                .with_statuses(["3. ОЖИДАЕМ ПРОВЕДЕНИЯ КОНСУЛЬТАЦИИ"]),
            Stage::new("treatment_discussion", "Treatment discussion", 10)
                .with_statuses(["3.1. ПЕРЕГОВОРЫ ПО ПРОГРАММЕ"])
                .with_fields(["Отправлен Offer"])
                .with_purchase_rate(0.12),
            Stage::new("prior_consent", "Prior consent", 11)
                .with_statuses(["4. СОГЛАСЕН НА ЛЕЧЕНИЕ"])
                .with_fields(["Предварительное согласие"])
                .with_purchase_rate(0.51),
            Stage::new("discount_request", "Discount request", 12)
                .with_statuses(["4.1. ЗАПРОС СКИДКИ"])
                .with_fields(["Запрос скидки"])
                .with_purchase_rate(0.51),
            Stage::new("pre_reserved", "Pre-reserved", 13)
                .with_statuses(["4.2. ПРЕДВАРИТЕЛЬНАЯ БРОНЬ"])
                .with_fields(["Предварительная бронь"])
                .with_purchase_rate(0.51),
            Stage::new("pre_paid", "Pre-paid", 14)
                .with_statuses(["4.3. ЕСТЬ ПРЕДОПЛАТА"])
                .with_fields(["Есть предоплата"])
                .with_purchase_rate(0.85),
            Stage::new("waiting_for_arrival", "Waiting for arrival", 15)
                .with_statuses(["5. БРОНЬ В КЛИНИКУ"])
                .with_fields(["Ожидаем приезда"])
                .with_purchase_rate(0.85),
            Stage::new("treatment", "Treatment", 16)
                .with_statuses(["6. СЕЙЧАС В КЛИНИКЕ"])
                .with_fields(["Сейчас В клинике"])
                .with_purchase_rate(1.0),
            Stage::new("audit", "Audit", 17)
                .with_statuses(["7. ВЫПИСАН ИЗ КЛИНИКИ (АУДИТ)"])
                .with_fields(["Аудит"])
                .with_purchase_rate(1.0)
                .not_at_work(),
            Stage::new("purchase", "Purchase", 18)
                .with_statuses(["УСПЕШНО РЕАЛИЗОВАНО"])
                .with_fields(["Продажа"])
                .with_purchase_rate(1.0)
                .not_at_work(),
        ],
    )
}

fn swiss_medica_fields() -> Vec<FieldSpec> {
    vec![
        FieldSpec::new("pipeline_id", "Pipeline id").raw(),
        FieldSpec::new("status_id", "Status id").raw(),
        FieldSpec::custom(
            "added_to_arrival_timetable",
            "Added to arrival timetable",
            "Внесен в Arrival Timetable",
        ),
        FieldSpec::custom("agent", "Agent", "Agent").flag(),
        FieldSpec::custom("arrival_chance", "Arrival chance", "(%) Arrival chance"),
        FieldSpec::custom("clinic", "Clinic", "Клиника"),
        FieldSpec::custom("consulting_doctor", "Consulting doctor", "Консультирующий доктор"),
        FieldSpec::custom("curing_doctor", "Curing doctor", "Лечащий врач"),
        FieldSpec::custom("date_of_admission", "Date of admission", "Дата начала лечения").date(),
        FieldSpec::custom("date_of_offer", "Date of offer", "Отправили OFFER Пациенту.").date(),
        FieldSpec::custom(
            "date_of_questionnaire_recieved",
            "Date of questionnaire recieved",
            "Recieved Questionnair",
        )
        .date(),
        FieldSpec::custom(
            "date_of_prior_consent",
            "Date of prior consent",
            "Дата предварительного согласия",
        )
        .date(),
        FieldSpec::custom(
            "date_of_treatment_end",
            "Date of treatment end",
            "Дата завершения лечения",
        )
        .date(),
        FieldSpec::custom(
            "days_at_the_clinic",
            "Days at the clinic",
            "Days in Clinic (Stay duration)",
        ),
        FieldSpec::custom("edss", "EDSS", "EDSS"),
        FieldSpec::custom("ha_included", "HA included", "Включен HA"),
        FieldSpec::custom("google_id", "Google id", "Google Client ID"),
        FieldSpec::custom("language", "Language", "Spoken language"),
        FieldSpec::custom("patient_folder", "Patient folder", "Папка Пациента"),
        FieldSpec::custom("payment_method", "Payment method", "Способ оплаты"),
        FieldSpec::custom("pre_pay", "Pre-pay", "Сумма предоплаты, Евро"),
        FieldSpec::custom("treatment", "Treatment", "Disease"),
        FieldSpec::custom("treatment_if_other", "Treatment if other", "Disease if other"),
        FieldSpec::new("offer_sent_in_days", "Offer sent in days"),
        FieldSpec::new("duration_30_days", "Duration, 30 days"),
        FieldSpec::new("28_days_prior_consent", "Prior consent within 28 days"),
        FieldSpec::new("7_days_questionnaire_recieved", "Questionnaire within 7 days"),
        FieldSpec::new("14_days_offer_sent", "Offer within 14 days"),
        FieldSpec::new("35_days_prior_consent", "Prior consent within 35 days"),
        FieldSpec::new("14_days_questionnaire_recieved", "Questionnaire within 14 days"),
        FieldSpec::new("21_days_offer_sent", "Offer within 21 days"),
    ]
}

fn swiss_medica_country() -> CountryConfig {
    let replacements: BTreeMap<String, String> = [
        ("Srbija", "Serbia"),
        ("Россия", "Russia"),
        ("Russian Federation", "Russia"),
        ("Украина", "Ukraine"),
        ("Казахстан", "Kazakhstan"),
        ("Беларусь", "Belarus"),
        ("Germany ", "Germany"),
        ("Deutschland", "Germany"),
        ("USA", "United States"),
        ("United States of America", "United States"),
        ("UK", "United Kingdom"),
        ("Italia", "Italy"),
    ]
    .iter()
    .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
    .collect();

    CountryConfig {
        primary_field: Some("Country".to_string()),
        candidate_fields: strings(&["Страна", "Country_from_Jivo", "Country"]),
        contact_fields: strings(&[
            "Country by phone",
            "Страна по номеру телефона",
            "Country by IP",
        ]),
        replacements,
        dialing_codes: DialingCodes::common(),
        ..CountryConfig::default()
    }
}

/// The Swiss Medica account: one medical-tourism funnel, Italian milestone
/// windows and a purchase → audit → treatment fallback chain.
///
/// No duty schedule is set; callers pass one per run.
///
/// # Errors
///
/// Only if the built-in funnel fails validation.
pub fn swiss_medica() -> Result<TenantConfig, ConfigError> {
    Ok(TenantConfig {
        name: "swiss_medica".to_string(),
        subdomain: "swissmedica".to_string(),
        utc_offset_hours: 3,
        models: vec![swiss_medica_funnel()?],
        fields: swiss_medica_fields(),
        not_lead_loss_reasons: strings(&[
            "Duplicate Lead",
            "SPAM",
            "СПАМ",
            "Ресерч\\Студент\\Поиск работы",
            "Тестовая сделка",
            "Неправильные контакты ( неправильный но",
            "Неправильные контакты ( неправильный номер \\ нет н",
            "Пациент не отправлял заявку",
        ]),
        target_loss_reasons: strings(&[
            "Пропал (перестал выходить на связь)/не беспокоить",
            "Заморожен/передумал",
            "Нет денег/Цена не устраивает",
            "До 4 лет или до 18кг",
            "Нетранспортабельный",
            "Пугает страна/путешествие",
            "Врач\\ родственники\\ друзья не рекомендуют",
            "Смерть пациента",
            "Негатив после лечения",
            "Отказ консилиума",
            "Выбрал конкурента",
            "Хочет гарантий",
            "Нет результатов от лечения",
            "Ожидают лучшего результата",
            "Сербия",
            "Пациента Ведет Сербия",
            "Пациент из Сербии",
            "Сделку ведет В.Н.",
        ]),
        attribution_rules: Vec::new(),
        schedule: None,
        status_labels: StatusLabels::default(),
        country: swiss_medica_country(),
        milestones: vec![
            MilestoneWindow::new("28_days_prior_consent", "date_of_prior_consent", 28),
            MilestoneWindow::new("7_days_questionnaire_recieved", "date_of_questionnaire_recieved", 7),
            MilestoneWindow::new("14_days_offer_sent", "date_of_offer", 14),
            MilestoneWindow::new("35_days_prior_consent", "date_of_prior_consent", 35)
                .for_pipelines(ITALY_PIPELINES),
            MilestoneWindow::new(
                "14_days_questionnaire_recieved",
                "date_of_questionnaire_recieved",
                14,
            )
            .for_pipelines(ITALY_PIPELINES),
            MilestoneWindow::new("21_days_offer_sent", "date_of_offer", 21)
                .for_pipelines(ITALY_PIPELINES),
        ],
        offer_speed: Some(OfferSpeedRule {
            key: "offer_sent_in_days".to_string(),
            from_field: "Recieved Questionnair".to_string(),
            to_field: "Отправили OFFER Пациенту.".to_string(),
            cap_days: 45,
        }),
        purchase_chain: strings(&["purchase", "audit", "treatment"]),
        duration_30_days: true,
        check_by_stages: false,
        weekly_date_fields: strings(&["date_of_prior_consent", "date_of_admission"]),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_swiss_medica_is_valid() {
        let config = swiss_medica().unwrap();
        config.validate().unwrap();
        assert_eq!(config.models[0].len(), 19);
        assert_eq!(config.purchase_chain, strings(&["purchase", "audit", "treatment"]));
    }

    #[test]
    fn test_swiss_medica_funnel_order() {
        let config = swiss_medica().unwrap();
        let keys: Vec<&str> = config.models[0]
            .get_ordered_stages()
            .iter()
            .map(|s| s.key.as_str())
            .collect();
        assert_eq!(keys.first(), Some(&"raw_lead"));
        assert_eq!(keys.last(), Some(&"purchase"));
        let audit = config.models[0].stage("audit").unwrap();
        assert!(!audit.counts_as_active_workload);
    }

    #[test]
    fn test_swiss_medica_round_trips_through_json() {
        let config = swiss_medica().unwrap();
        let json = serde_json::to_string(&config).unwrap();
        let parsed = TenantConfig::from_json_str(&json).unwrap();
        assert_eq!(parsed, config);
    }
}
