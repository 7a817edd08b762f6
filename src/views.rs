//! Screens of the bot, rendered into transport-neutral [`View`]s.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;

use crate::catalog::{Catalog, Course, CourseId, PaymentChannel, PaymentDetails};
use crate::i18n::{Locale, Localizer};
use crate::machine::{Action, Notice};
use crate::session::{Applicant, Step};
use crate::transport::{Button, View};
use crate::validation::{Field, Reason, ValidationError};

/// Renders screens for one locale at one point in time.
#[derive(Debug, Clone, Copy)]
pub struct Renderer<'a> {
    pub i18n: &'a Localizer,
    pub locale: Locale,
    pub catalog: &'a Catalog,
    pub now: DateTime<Utc>,
    pub support_url: Option<&'a str>,
}

impl<'a> Renderer<'a> {
    fn t(&self, key: &str) -> String {
        self.i18n.t(self.locale, key)
    }

    fn t_with(&self, key: &str, params: &[(&str, &str)]) -> String {
        self.i18n.t_with(self.locale, key, params)
    }

    fn button(&self, key: &str, action: Action) -> Button {
        Button::callback(self.t(key), action.callback_data())
    }

    fn back_to_courses(&self) -> Button {
        self.button("buttons.backToCourses", Action::BackToCourses)
    }

    fn date(&self, date: NaiveDate) -> String {
        date.format(&self.t("format.date")).to_string()
    }

    fn price(&self, amount: Decimal, currency: &str) -> String {
        format!("{} {}", amount.normalize(), currency)
    }

    /// The screen belonging to `step`.
    pub fn step(&self, step: &Step) -> View {
        let course = step.selected_course().and_then(|id| self.catalog.get(id));
        match (step, course) {
            (Step::Start, _) => self.catalog_root(),
            (Step::CourseDetail { .. }, Some(course)) => self.course_detail(course),
            (Step::EnteringName { course_id }, _) => self.prompt(Field::Name, *course_id),
            (Step::EnteringEmail { course_id, .. }, _) => self.prompt(Field::Email, *course_id),
            (Step::EnteringPosition { course_id, .. }, _) => self.prompt(Field::Position, *course_id),
            (Step::SavePending { record }, _) => self.save_failed(record.item_id),
            (Step::SelectingBank { applicant, .. }, Some(course)) => self.saved(course, applicant),
            (Step::Completed { channel, .. }, Some(course)) => self.payment(course, *channel),
            // The course disappeared from the catalog.
            _ => self.catalog_root(),
        }
    }

    pub fn catalog_root(&self) -> View {
        let mut text = self.t("catalog.title");
        for (index, course) in self.catalog.all().iter().enumerate() {
            let position = (index + 1).to_string();
            let price = self.price(course.effective_price(self.now), &course.currency);
            text.push_str("\n\n");
            text.push_str(&self.t_with(
                "catalog.item",
                &[
                    ("index", &position),
                    ("name", &escape_markdown(&course.name)),
                    ("description", &escape_markdown(&course.short_description)),
                    ("price", &price),
                ],
            ));
            if let Some(promo) = course.active_promotion(self.now) {
                text.push('\n');
                text.push_str(&self.t_with(
                    "catalog.promo",
                    &[
                        ("name", &escape_markdown(&promo.name)),
                        ("date", &self.date(promo.end_date)),
                    ],
                ));
            }
        }
        text.push_str("\n\n");
        text.push_str(&self.t("catalog.footer"));

        self.catalog
            .all()
            .iter()
            .fold(View::text(text).markdown(), |view, course| {
                view.button(Button::callback(
                    course.name.clone(),
                    Action::SelectCourse(course.id).callback_data(),
                ))
            })
    }

    pub fn course_detail(&self, course: &Course) -> View {
        let mut lines = vec![
            format!("*{}*", escape_markdown(&course.name)),
            escape_markdown(&course.description),
        ];
        if !course.authors.is_empty() {
            lines.push(self.t_with(
                "course.authors",
                &[("authors", &escape_markdown(&course.authors_line()))],
            ));
        }
        lines.push(self.t_with(
            "course.dates",
            &[
                ("start", &self.date(course.start_date)),
                ("end", &self.date(course.end_date)),
            ],
        ));
        lines.push(self.t_with(
            "course.price",
            &[("price", &self.price(course.price, &course.currency))],
        ));
        if let Some(promo) = course.active_promotion(self.now) {
            let mut line = self.t_with(
                "course.promotion",
                &[
                    ("name", &escape_markdown(&promo.name)),
                    ("price", &self.price(promo.price, &course.currency)),
                    ("date", &self.date(promo.end_date)),
                ],
            );
            if let Some(description) = &promo.description {
                line.push('\n');
                line.push_str(&escape_markdown(description));
            }
            lines.push(line);
        }

        View::text(lines.join("\n\n"))
            .markdown()
            .without_link_preview()
            .button(self.button("buttons.buy", Action::Buy))
            .button(self.back_to_courses())
    }

    pub fn prompt(&self, field: Field, course_id: CourseId) -> View {
        View::text(self.t(&format!("prompts.{}", field.key())))
            .button(self.button("buttons.backToCourse", Action::SelectCourse(course_id)))
            .button(self.back_to_courses())
    }

    /// Explains why the input was refused and repeats the question.
    pub fn rejection(&self, err: &ValidationError, course_id: CourseId) -> View {
        let message = match &err.reason {
            Reason::DidYouMean { suggestion } => {
                self.t_with(&err.message_key(), &[("suggestion", suggestion)])
            }
            _ => self.t(&err.message_key()),
        };
        let mut view = self.prompt(err.field, course_id);
        view.text = format!("{message}\n\n{}", view.text);
        view
    }

    /// Confirmation after a successful save, with the channel chooser.
    pub fn saved(&self, course: &Course, applicant: &Applicant) -> View {
        let text = self.t_with(
            "save.success",
            &[("name", &applicant.name), ("course", &course.name)],
        );
        course
            .channels(self.now)
            .into_iter()
            .fold(View::text(text), |view, channel| {
                view.button(self.button(
                    &format!("buttons.{}", channel.code()),
                    Action::SelectChannel(channel),
                ))
            })
            .button(self.button("buttons.backToCourse", Action::SelectCourse(course.id)))
            .button(self.back_to_courses())
    }

    pub fn save_failed(&self, course_id: CourseId) -> View {
        let mut view = View::text(self.t("save.failed"))
            .button(self.button("buttons.retry", Action::RetrySave))
            .button(self.button("buttons.backToCourse", Action::SelectCourse(course_id)))
            .button(self.back_to_courses());
        if let Some(url) = self.support_url {
            view = view.button(Button::url(self.t("buttons.support"), url));
        }
        view
    }

    /// Payment instructions for the chosen channel.
    pub fn payment(&self, course: &Course, channel: PaymentChannel) -> View {
        let price = self.price(course.effective_price(self.now), &course.currency);
        let mut text = self.t_with("payment.header", &[("course", &course.name), ("price", &price)]);
        text.push_str("\n\n");

        let details = course.payment_details(channel, self.now);
        match details {
            Some(PaymentDetails::Link { url, .. }) => {
                text.push_str(&self.t_with("payment.link", &[("url", url)]));
            }
            Some(PaymentDetails::QrCode { .. }) => text.push_str(&self.t("payment.qr")),
            Some(PaymentDetails::Requisites {
                iban,
                tax_id,
                recipient,
                purpose,
            }) => text.push_str(&self.t_with(
                "payment.requisites",
                &[
                    ("iban", iban),
                    ("taxId", tax_id),
                    ("recipient", recipient),
                    ("purpose", purpose),
                ],
            )),
            None => text.push_str(&self.t("payment.unavailable")),
        }

        let mut view = View::text(text)
            .without_link_preview()
            .button(self.button("buttons.backToBanks", Action::BackToChannels))
            .button(self.back_to_courses());
        if let Some(asset) = details.and_then(PaymentDetails::qr_asset) {
            view = view.with_photo(asset);
        }
        view
    }

    pub fn help(&self) -> View {
        View::text(self.t("help.text")).button(self.back_to_courses())
    }

    pub fn notice(&self, notice: Notice) -> String {
        self.t(notice.key())
    }

    /// The current screen of `step`, prefixed with a notice.
    pub fn with_notice(&self, notice: Notice, step: &Step) -> View {
        let mut view = self.step(step);
        view.text = format!("{}\n\n{}", self.notice(notice), view.text);
        view
    }

    pub fn expired(&self) -> String {
        self.t("errors.expired")
    }

    /// Reply for unexpected failures: an apology and a way back to the root.
    pub fn failure(&self) -> View {
        View::text(self.t("errors.generic")).button(self.back_to_courses())
    }
}

/// Escapes the characters the legacy Markdown parse mode treats specially.
pub fn escape_markdown(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '_' | '*' | '`' | '[') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::tests::SAMPLE;
    use crate::ledger::SubmissionRecord;
    use crate::validation::validate_email;
    use chrono::TimeZone;

    struct Fixture {
        i18n: Localizer,
        catalog: Catalog,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                i18n: Localizer::bundled(Locale::Ua).unwrap(),
                catalog: Catalog::from_json(SAMPLE).unwrap(),
            }
        }

        fn renderer(&self, now: DateTime<Utc>) -> Renderer<'_> {
            Renderer {
                i18n: &self.i18n,
                locale: Locale::En,
                catalog: &self.catalog,
                now,
                support_url: Some("https://t.me/support"),
            }
        }
    }

    fn october() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 10, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn root_lists_courses_in_catalog_order() {
        let fixture = Fixture::new();
        let view = fixture.renderer(october()).catalog_root();
        assert_eq!(view.callbacks(), vec!["course_1", "course_3"]);
        let first = view.text.find("Storytelling Basics").unwrap();
        let second = view.text.find("Pitching").unwrap();
        assert!(first < second);
        assert!(view.text.contains("990.5 UAH"));
    }

    #[test]
    fn root_shows_active_promotions() {
        let fixture = Fixture::new();
        let during = Utc.with_ymd_and_hms(2025, 9, 1, 12, 0, 0).unwrap();
        let view = fixture.renderer(during).catalog_root();
        assert!(view.text.contains("700 UAH"));
        assert!(view.text.contains("Early bird"));
    }

    #[test]
    fn detail_offers_buy_and_back() {
        let fixture = Fixture::new();
        let renderer = fixture.renderer(october());
        let view = renderer.course_detail(fixture.catalog.get(CourseId(1)).unwrap());
        assert_eq!(view.callbacks(), vec!["buy_course", "back_to_courses"]);
        assert!(view.text.contains("Iryna Tkach, Oleh Bondar"));
        assert!(view.text.contains("October 1, 2025"));
    }

    #[test]
    fn rejection_repeats_the_question() {
        let fixture = Fixture::new();
        let renderer = fixture.renderer(october());
        let err = validate_email("john@gmai.com").unwrap_err();
        let view = renderer.rejection(&err, CourseId(3));
        let prompt = renderer.prompt(Field::Email, CourseId(3));
        assert!(view.text.contains("john@gmail.com"));
        assert!(view.text.ends_with(&prompt.text));
        assert_eq!(view.keyboard, prompt.keyboard);
    }

    #[test]
    fn saved_screen_offers_only_configured_channels() {
        let fixture = Fixture::new();
        let renderer = fixture.renderer(october());
        let applicant = Applicant {
            name: "John Smith".into(),
            email: "john@gmail.com".into(),
            position: "QA".into(),
        };
        let view = renderer.saved(fixture.catalog.get(CourseId(3)).unwrap(), &applicant);
        assert_eq!(
            view.callbacks(),
            vec!["select_bank_privatbank", "course_3", "back_to_courses"]
        );
    }

    #[test]
    fn save_failure_offers_retry_and_support() {
        let fixture = Fixture::new();
        let record = SubmissionRecord {
            submitted_at: october(),
            submitter: "jsmith".into(),
            email: "john@gmail.com".into(),
            name: "John Smith".into(),
            position: "QA".into(),
            item_id: CourseId(1),
            item_name: "Storytelling Basics".into(),
        };
        let view = fixture.renderer(october()).step(&Step::SavePending { record });
        assert_eq!(view.callbacks(), vec!["retry_save_data", "course_1", "back_to_courses"]);
        assert_eq!(view.keyboard.len(), 4);
    }

    #[test]
    fn payment_screens_follow_the_details_variant() {
        let fixture = Fixture::new();
        let renderer = fixture.renderer(october());
        let course = fixture.catalog.get(CourseId(1)).unwrap();

        let link = renderer.payment(course, PaymentChannel::Privatbank);
        assert!(link.text.contains("https://pay.example/1"));
        assert_eq!(link.photo.as_deref(), Some("https://pay.example/1.png"));
        assert_eq!(link.callbacks(), vec!["back_to_banks", "back_to_courses"]);

        let requisites = renderer.payment(course, PaymentChannel::Monobank);
        assert!(requisites.text.contains("UA00"));
        assert!(requisites.text.contains("FOP Tkach"));
        assert_eq!(requisites.photo, None);
    }

    #[test]
    fn markdown_specials_are_escaped() {
        assert_eq!(escape_markdown("a_b *c* [d]"), "a\\_b \\*c\\* \\[d]");
    }
}
